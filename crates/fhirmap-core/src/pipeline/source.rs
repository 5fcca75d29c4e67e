//! Source parsers turning raw bytes into lazy item iterators

use crate::types::SourceFormat;
use crate::{Error, Result};
use serde::de::{self, Deserializer as _, SeqAccess, Visitor};
use serde_json::{Map, Value};
use std::fmt;
use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::{sync_channel, SyncSender};

/// Items pulled one at a time by the stage driver; an `Err` is terminal
pub type ItemIter = Box<dyn Iterator<Item = Result<Value>> + Send>;

/// Item iterator for `format`
pub fn items<R: Read + Send + 'static>(format: SourceFormat, reader: R) -> Result<ItemIter> {
    match format {
        SourceFormat::Tabular => tabular_items(reader),
        SourceFormat::JsonLike => json_items(reader),
    }
}

/// CSV rows with a header line, each row an object keyed by header
///
/// Empty cells become `null`.
pub fn tabular_items<R: Read + Send + 'static>(reader: R) -> Result<ItemIter> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    if headers.is_empty() {
        return Err(Error::invalid_input("Tabular input has no header row"));
    }

    let rows = csv_reader.into_records().map(move |row| {
        let row = row?;
        let mut item = Map::with_capacity(headers.len());
        for (position, header) in headers.iter().enumerate() {
            let cell = match row.get(position) {
                Some(cell) if !cell.is_empty() => Value::String(cell.to_string()),
                _ => Value::Null,
            };
            item.insert(header.to_string(), cell);
        }
        Ok(Value::Object(item))
    });
    Ok(Box::new(rows))
}

/// A top-level JSON array, or concatenated / newline-delimited JSON values
///
/// Both are read one value at a time. Array elements are parsed on a reader
/// thread that waits whenever the previous element has not been taken yet.
pub fn json_items<R: Read + Send + 'static>(reader: R) -> Result<ItemIter> {
    let mut reader = BufReader::new(reader);
    let first = loop {
        let buffer = reader.fill_buf()?;
        match buffer.iter().position(|b| !b.is_ascii_whitespace()) {
            Some(offset) => {
                let byte = buffer[offset];
                reader.consume(offset);
                break Some(byte);
            }
            None if buffer.is_empty() => break None,
            None => {
                let len = buffer.len();
                reader.consume(len);
            }
        }
    };

    match first {
        None => Ok(Box::new(std::iter::empty())),
        Some(b'[') => array_elements(reader),
        Some(_) => {
            let values = serde_json::Deserializer::from_reader(reader)
                .into_iter::<Value>()
                .map(|value| value.map_err(|e| malformed_json(e, "JSON value stream")));
            Ok(Box::new(values))
        }
    }
}

const CONSUMER_GONE: &str = "array consumer dropped";

fn array_elements<R: Read + Send + 'static>(reader: R) -> Result<ItemIter> {
    let (tx, rx) = sync_channel::<Result<Value>>(1);
    std::thread::Builder::new()
        .name("json-array-reader".to_string())
        .spawn(move || {
            let mut deserializer = serde_json::Deserializer::from_reader(reader);
            let outcome = deserializer
                .deserialize_seq(ForwardElements { tx: &tx })
                .and_then(|()| deserializer.end());
            match outcome {
                Ok(()) => {}
                Err(e) if e.to_string().starts_with(CONSUMER_GONE) => {
                    tracing::debug!("JSON array reader stopped early");
                }
                Err(e) => {
                    if tx.send(Err(malformed_json(e, "JSON array input"))).is_err() {
                        tracing::debug!("JSON array error dropped: consumer gone");
                    }
                }
            }
        })?;
    Ok(Box::new(rx.into_iter()))
}

/// Sends each array element as soon as it is parsed
struct ForwardElements<'a> {
    tx: &'a SyncSender<Result<Value>>,
}

impl<'de> Visitor<'de> for ForwardElements<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON array of items")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<(), A::Error> {
        while let Some(element) = seq.next_element::<Value>()? {
            if self.tx.send(Ok(element)).is_err() {
                return Err(de::Error::custom(CONSUMER_GONE));
            }
        }
        Ok(())
    }
}

fn malformed_json(error: serde_json::Error, what: &str) -> Error {
    Error::InvalidInputData {
        message: format!("Malformed {what} at line {}: {error}", error.line()),
        source: Some(error.into()),
    }
}
