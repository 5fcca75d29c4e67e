//! Validation and transformation function registry
//!
//! Field mappings name their functions by string (`REQUIRED`,
//! `FORMAT_DATE`, ...). The registry is a closed map from those names to
//! typed function objects, fixed once construction is done, so that the
//! mapping checker can reject unknown names before any item is processed.
//!
//! # Module Organization
//!
//! - [`types`] - Function signatures, call context and detail helpers
//! - [`validation`] - Built-in validation functions
//! - [`transformation`] - Built-in transformation functions
//!
//! # Examples
//!
//! ```
//! use fhirmap_core::registry::{FunctionContext, FunctionRegistry};
//! use serde_json::json;
//!
//! let registry = FunctionRegistry::with_builtins();
//! let details = json!({"inputFormat": "dd/MM/yyyy", "outputFormat": "yyyy-MM-dd"});
//! let row = json!({});
//! let ctx = FunctionContext::new(&row);
//!
//! let out = registry
//!     .transform("FORMAT_DATE", &json!("15/01/2023"), details.as_object().unwrap(), &ctx)
//!     .unwrap();
//! assert_eq!(out, json!("2023-01-15"));
//! ```
//!
//! Copyright (c) 2025 fhirmap contributors
//! Licensed under the Apache-2.0 license

pub mod transformation;
pub mod types;
pub mod validation;


pub use types::{names, FunctionContext, TransformationFn, ValidationFn};

use crate::types::FunctionDetails;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Named validation and transformation functions
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    validations: HashMap<String, ValidationFn>,
    transformations: HashMap<String, TransformationFn>,
}

impl FunctionRegistry {
    /// Registry with no functions
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in function
    pub fn with_builtins() -> Self {
        Self::new()
            .register_validation(names::REQUIRED, validation::required)
            .register_validation_fn(names::REGEX, validation::regex())
            .register_validation(names::MIN_LENGTH, validation::min_length)
            .register_validation(names::MAX_LENGTH, validation::max_length)
            .register_validation(names::VALUESET, validation::valueset)
            .register_transformation(names::FORMAT_DATE, transformation::format_date)
            .register_transformation(names::STRING_CASE, transformation::string_case)
            .register_transformation(names::CODE_LOOKUP, transformation::code_lookup)
            .register_transformation(names::CONCATENATE, transformation::concatenate)
            .register_transformation(names::DEFAULT_VALUE, transformation::default_value)
    }

    /// Add or replace a validation function
    pub fn register_validation<F>(self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Value, &FunctionDetails, &FunctionContext<'_>) -> Option<String> + Send + Sync + 'static,
    {
        self.register_validation_fn(name, Arc::new(function))
    }

    /// Add or replace a shared validation function
    pub fn register_validation_fn(mut self, name: impl Into<String>, function: ValidationFn) -> Self {
        self.validations.insert(name.into(), function);
        self
    }

    /// Add or replace a transformation function
    pub fn register_transformation<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Value, &FunctionDetails, &FunctionContext<'_>) -> Result<Value, String>
            + Send
            + Sync
            + 'static,
    {
        self.transformations.insert(name.into(), Arc::new(function));
        self
    }

    pub fn has_validation(&self, name: &str) -> bool {
        self.validations.contains_key(name)
    }

    pub fn has_transformation(&self, name: &str) -> bool {
        self.transformations.contains_key(name)
    }

    pub fn validation(&self, name: &str) -> Option<&ValidationFn> {
        self.validations.get(name)
    }

    pub fn transformation(&self, name: &str) -> Option<&TransformationFn> {
        self.transformations.get(name)
    }

    /// Run a validation by name; an unknown name is itself a failure
    pub fn validate(
        &self,
        name: &str,
        value: &Value,
        details: &FunctionDetails,
        ctx: &FunctionContext<'_>,
    ) -> Option<String> {
        match self.validations.get(name) {
            Some(function) => function(value, details, ctx),
            None => Some(format!("Unknown validation function '{name}'")),
        }
    }

    /// Run a transformation by name; an unknown name is itself a failure
    pub fn transform(
        &self,
        name: &str,
        value: &Value,
        details: &FunctionDetails,
        ctx: &FunctionContext<'_>,
    ) -> Result<Value, String> {
        match self.transformations.get(name) {
            Some(function) => function(value, details, ctx),
            None => Err(format!("Unknown transformation function '{name}'")),
        }
    }

    /// Registered validation names, sorted
    pub fn validation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered transformation names, sorted
    pub fn transformation_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transformations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("validations", &self.validation_names())
            .field("transformations", &self.transformation_names())
            .finish()
    }
}
