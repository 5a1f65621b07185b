//! Configuration validation for pluggable implementations.
//!
//! Every implementation (storage backend, signer, chain client, multisig
//! service, verifier) receives its own raw TOML table. Before it is built the
//! table is checked against a [`Schema`] describing required and optional
//! fields, their types and any extra constraints.

use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
	#[error("Failed to deserialize config: {0}")]
	DeserializationError(String),
}

impl ValidationError {
	/// Prefixes the field path with `parent.` for errors raised in nested tables.
	fn nested_in(self, parent: &str) -> Self {
		match self {
			ValidationError::MissingField(f) => {
				ValidationError::MissingField(format!("{}.{}", parent, f))
			},
			ValidationError::InvalidValue { field, message } => ValidationError::InvalidValue {
				field: format!("{}.{}", parent, field),
				message,
			},
			ValidationError::TypeMismatch {
				field,
				expected,
				actual,
			} => ValidationError::TypeMismatch {
				field: format!("{}.{}", parent, field),
				expected,
				actual,
			},
			other => other,
		}
	}
}

/// Type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// An integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	Boolean,
	/// An array whose elements all have the inner type.
	Array(Box<FieldType>),
	/// A nested table with its own schema.
	Table(Schema),
}

impl FieldType {
	fn name(&self) -> &'static str {
		match self {
			FieldType::String => "string",
			FieldType::Integer { .. } => "integer",
			FieldType::Boolean => "boolean",
			FieldType::Array(_) => "array",
			FieldType::Table(_) => "table",
		}
	}
}

/// Extra check run after the type check. Returns an error message on failure.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

/// A named field in a [`Schema`].
pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	/// Attaches a custom validator, run after the type check passes.
	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, value: &toml::Value) -> Result<(), ValidationError> {
		validate_field_type(&self.name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: self.name.clone(),
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of a TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates `config`, which must be a table.
	///
	/// Unknown keys are accepted. Optional fields are only checked when present.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: "root".to_string(),
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(field.name.clone()))?;
			field.check(value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(value)?;
			}
		}

		Ok(())
	}
}

fn type_mismatch(field_name: &str, expected: &FieldType, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field_name.to_string(),
		expected: expected.name().to_string(),
		actual: value.type_str().to_string(),
	}
}

fn validate_field_type(
	field_name: &str,
	value: &toml::Value,
	expected_type: &FieldType,
) -> Result<(), ValidationError> {
	match expected_type {
		FieldType::String if value.is_str() => Ok(()),
		FieldType::Boolean if value.is_bool() => Ok(()),
		FieldType::String | FieldType::Boolean => {
			Err(type_mismatch(field_name, expected_type, value))
		},
		FieldType::Integer { min, max } => {
			let int_val = value
				.as_integer()
				.ok_or_else(|| type_mismatch(field_name, expected_type, value))?;

			if let Some(min_val) = min.filter(|m| int_val < *m) {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("Value {} is less than minimum {}", int_val, min_val),
				});
			}
			if let Some(max_val) = max.filter(|m| int_val > *m) {
				return Err(ValidationError::InvalidValue {
					field: field_name.to_string(),
					message: format!("Value {} is greater than maximum {}", int_val, max_val),
				});
			}
			Ok(())
		},
		FieldType::Array(inner_type) => {
			let array = value
				.as_array()
				.ok_or_else(|| type_mismatch(field_name, expected_type, value))?;
			for (i, item) in array.iter().enumerate() {
				validate_field_type(&format!("{}[{}]", field_name, i), item, inner_type)?;
			}
			Ok(())
		},
		FieldType::Table(schema) => schema
			.validate(value)
			.map_err(|e| e.nested_in(field_name)),
	}
}

/// Validates an implementation's TOML table.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(s: &str) -> toml::Value {
		toml::from_str(s).unwrap()
	}

	fn schema() -> Schema {
		Schema::new(
			vec![Field::new("storage_path", FieldType::String)],
			vec![
				Field::new(
					"jobs",
					FieldType::Integer {
						min: Some(1),
						max: Some(16),
					},
				),
				Field::new(
					"nested",
					FieldType::Table(Schema::new(
						vec![Field::new("flag", FieldType::Boolean)],
						vec![],
					)),
				),
				Field::new("patterns", FieldType::Array(Box::new(FieldType::String)))
					.with_validator(|v| match v.as_array() {
						Some(a) if a.is_empty() => Err("must not be empty".to_string()),
						_ => Ok(()),
					}),
			],
		)
	}

	#[test]
	fn test_valid_config_passes() {
		let config = parse(
			r#"
storage_path = "./db.json"
jobs = 4
patterns = ["Pool*"]
[nested]
flag = true
"#,
		);
		assert!(schema().validate(&config).is_ok());
	}

	#[test]
	fn test_missing_required_field() {
		let err = schema().validate(&parse("jobs = 2")).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(f) if f == "storage_path"));
	}

	#[test]
	fn test_integer_bounds() {
		let err = schema()
			.validate(&parse("storage_path = \"x\"\njobs = 0"))
			.unwrap_err();
		assert!(err.to_string().contains("less than minimum 1"));
	}

	#[test]
	fn test_nested_errors_carry_path() {
		let err = schema()
			.validate(&parse("storage_path = \"x\"\n[nested]\nflag = 1"))
			.unwrap_err();
		assert!(
			matches!(err, ValidationError::TypeMismatch { ref field, .. } if field == "nested.flag")
		);
	}

	#[test]
	fn test_custom_validator_and_array_elements() {
		let empty = schema()
			.validate(&parse("storage_path = \"x\"\npatterns = []"))
			.unwrap_err();
		assert!(empty.to_string().contains("must not be empty"));

		let wrong = schema()
			.validate(&parse("storage_path = \"x\"\npatterns = [1]"))
			.unwrap_err();
		assert!(wrong.to_string().contains("patterns[0]"));
	}
}
