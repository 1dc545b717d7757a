use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use jsonschema::Validator;
use serde_json::Value;

use crate::config::SchemaConfig;
use crate::error::{Result, SchemaError};
use crate::schema::JsonSchema;
use crate::validator::{check_value, compile};

const SCHEMA_SUFFIX: &str = ".schema.json";

/// Name-keyed catalog of compiled JSON Schema documents.
///
/// Names are free-form but conventionally follow the call they guard,
/// e.g. `todos.add.input` / `todos.add.output`.
pub struct SchemaCatalog {
    validators: HashMap<String, Arc<Validator>>,
    config: SchemaConfig,
}

impl SchemaCatalog {
    /// Create an empty catalog with default config.
    pub fn new() -> Self {
        Self::with_config(SchemaConfig::default())
    }

    /// Create an empty catalog with explicit config.
    pub fn with_config(config: SchemaConfig) -> Self {
        Self {
            validators: HashMap::new(),
            config,
        }
    }

    /// Register a schema document given as a JSON string.
    pub fn register(&mut self, name: &str, schema_json: &str) -> Result<()> {
        let schema: Value = serde_json::from_str(schema_json)
            .map_err(|err| SchemaError::LoadFailed(format!("{name}: {err}")))?;
        self.register_value(name, &schema)
    }

    /// Register a schema document. Names are unique; re-registering is an error.
    pub fn register_value(&mut self, name: &str, schema: &Value) -> Result<()> {
        if self.validators.contains_key(name) {
            return Err(SchemaError::Duplicate(name.to_string()));
        }

        let compiled = compile(schema, &self.config)?;
        self.validators.insert(name.to_string(), Arc::new(compiled));
        tracing::debug!(schema = name, strict = self.config.strict_mode, "schema registered");
        Ok(())
    }

    /// Load from embedded `(name, document)` pairs.
    pub fn from_embedded(schemas: &[(&str, &str)]) -> Result<Self> {
        Self::from_embedded_with_config(schemas, SchemaConfig::default())
    }

    /// Load from embedded `(name, document)` pairs with explicit config.
    pub fn from_embedded_with_config(
        schemas: &[(&str, &str)],
        config: SchemaConfig,
    ) -> Result<Self> {
        let mut catalog = Self::with_config(config);
        for (name, schema) in schemas {
            catalog.register(name, schema)?;
        }
        Ok(catalog)
    }

    /// Load every `<name>.schema.json` file in a directory.
    pub fn from_directory(path: &Path) -> Result<Self> {
        Self::from_directory_with_config(path, SchemaConfig::default())
    }

    /// Load every `<name>.schema.json` file in a directory with explicit config.
    ///
    /// Symlinked schema files are refused, as are files that exceed the
    /// configured size or push the count past the configured maximum.
    pub fn from_directory_with_config(path: &Path, config: SchemaConfig) -> Result<Self> {
        let mut catalog = Self::with_config(config);

        let entries = std::fs::read_dir(path)
            .map_err(|err| SchemaError::LoadFailed(format!("{}: {err}", path.display())))?;

        for entry in entries {
            let entry = entry.map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            let Some(name) = schema_name_from_file_name(&file_name)? else {
                continue;
            };

            let entry_path = entry.path();
            let link_metadata = std::fs::symlink_metadata(&entry_path)
                .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;
            if link_metadata.file_type().is_symlink() {
                return Err(SchemaError::LoadFailed(format!(
                    "refusing to load schema symlink: {file_name}"
                )));
            }
            if !link_metadata.is_file() {
                continue;
            }

            if catalog.validators.len() >= catalog.config.max_schemas_from_directory {
                return Err(SchemaError::LoadFailed(format!(
                    "schema count exceeds configured max ({})",
                    catalog.config.max_schemas_from_directory
                )));
            }

            let content = read_bounded(&entry_path, &link_metadata, &catalog.config)?;
            catalog.register(name, &content)?;
        }

        Ok(catalog)
    }

    /// Fetch a schema by name, decoding accepted values into `T`.
    pub fn schema<T>(&self, name: &str) -> Result<JsonSchema<T>> {
        self.validators
            .get(name)
            .map(|validator| JsonSchema::from_validator(Arc::clone(validator)))
            .ok_or_else(|| SchemaError::NoSchema(name.to_string()))
    }

    /// Check a value against a named schema.
    pub fn validate(&self, name: &str, value: &Value) -> Result<()> {
        match self.validators.get(name) {
            Some(validator) => check_value(validator, value),
            None => Err(SchemaError::NoSchema(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.validators.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.validators.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn config(&self) -> &SchemaConfig {
        &self.config
    }
}

impl Default for SchemaCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// `Ok(None)` for files that are not schemas at all; an error for schema
/// files whose name cannot be used as a catalog key.
fn schema_name_from_file_name(file_name: &str) -> Result<Option<&str>> {
    let Some(name) = file_name.strip_suffix(SCHEMA_SUFFIX) else {
        return Ok(None);
    };
    let well_formed = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !well_formed {
        return Err(SchemaError::LoadFailed(format!(
            "unrecognized schema filename: {file_name}"
        )));
    }
    Ok(Some(name))
}

fn read_bounded(
    path: &Path,
    link_metadata: &std::fs::Metadata,
    config: &SchemaConfig,
) -> Result<String> {
    let file = std::fs::File::open(path).map_err(|err| {
        SchemaError::LoadFailed(format!("failed opening schema {}: {err}", path.display()))
    })?;
    let opened_metadata = file
        .metadata()
        .map_err(|err| SchemaError::LoadFailed(err.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if link_metadata.dev() != opened_metadata.dev()
            || link_metadata.ino() != opened_metadata.ino()
        {
            return Err(SchemaError::LoadFailed(format!(
                "schema file changed during load: {}",
                path.display()
            )));
        }
    }
    #[cfg(not(unix))]
    let _ = link_metadata;

    let max_bytes = config.max_schema_file_size;
    if opened_metadata.len() > max_bytes as u64 {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large ({} bytes): {}",
            opened_metadata.len(),
            path.display()
        )));
    }

    // The file may grow between stat and read.
    let read_limit = u64::try_from(max_bytes.saturating_add(1)).unwrap_or(u64::MAX);
    let mut content = String::new();
    file.take(read_limit)
        .read_to_string(&mut content)
        .map_err(|err| {
            SchemaError::LoadFailed(format!("failed reading schema {}: {err}", path.display()))
        })?;
    if content.len() > max_bytes {
        return Err(SchemaError::LoadFailed(format!(
            "schema file too large while reading: {}",
            path.display()
        )));
    }

    Ok(content)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::schema::Schema;

    const TODO_SCHEMA: &str = r#"{
        "type": "object",
        "properties": {
            "_id": { "type": "string" },
            "done": { "type": "boolean" }
        },
        "required": ["_id", "done"]
    }"#;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Todo {
        #[serde(rename = "_id")]
        id: String,
        done: bool,
    }

    fn make_temp_schema_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "callprims-schema-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_schema(dir: &Path, file_name: &str, contents: &str) {
        std::fs::write(dir.join(file_name), contents.as_bytes()).unwrap();
    }

    #[test]
    fn register_and_fetch_typed_schema() {
        let mut catalog = SchemaCatalog::new();
        catalog.register("todos.item", TODO_SCHEMA).unwrap();

        let schema = catalog.schema::<Todo>("todos.item").unwrap();
        assert_eq!(
            schema.parse(json!({"_id": "1", "done": false})).unwrap(),
            Todo {
                id: "1".into(),
                done: false
            }
        );
        assert!(matches!(
            schema.parse(json!({"done": false})),
            Err(SchemaError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut catalog = SchemaCatalog::new();
        catalog.register("todos.item", TODO_SCHEMA).unwrap();

        assert!(matches!(
            catalog.register("todos.item", TODO_SCHEMA),
            Err(SchemaError::Duplicate(name)) if name == "todos.item"
        ));
    }

    #[test]
    fn missing_name_reports_no_schema() {
        let catalog = SchemaCatalog::new();
        assert!(matches!(
            catalog.schema::<Value>("nope"),
            Err(SchemaError::NoSchema(_))
        ));
        assert!(matches!(
            catalog.validate("nope", &json!({})),
            Err(SchemaError::NoSchema(_))
        ));
    }

    #[test]
    fn malformed_document_fails_to_load() {
        let mut catalog = SchemaCatalog::new();
        assert!(matches!(
            catalog.register("broken", "{not json"),
            Err(SchemaError::LoadFailed(_))
        ));
    }

    #[test]
    fn from_embedded_lists_sorted_names() {
        let catalog = SchemaCatalog::from_embedded(&[
            ("math.add.output", r#"{"type":"number"}"#),
            ("math.add.input", r#"{"type":"object","required":["a","b"]}"#),
        ])
        .unwrap();

        assert_eq!(catalog.names(), vec!["math.add.input", "math.add.output"]);
        assert!(catalog.validate("math.add.output", &json!(15)).is_ok());
        assert!(catalog.validate("math.add.output", &json!("15")).is_err());
    }

    #[test]
    fn from_directory_loads_schema_files_only() {
        let dir = make_temp_schema_dir("load");
        write_schema(&dir, "todos.item.schema.json", TODO_SCHEMA);
        write_schema(&dir, "notes.json", TODO_SCHEMA);

        let catalog = SchemaCatalog::from_directory(&dir).unwrap();
        assert_eq!(catalog.names(), vec!["todos.item"]);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn strict_directory_catalog_closes_objects() {
        let dir = make_temp_schema_dir("strict");
        write_schema(&dir, "todos.item.schema.json", TODO_SCHEMA);

        let catalog = SchemaCatalog::from_directory_with_config(
            &dir,
            SchemaConfig {
                strict_mode: true,
                ..SchemaConfig::default()
            },
        )
        .unwrap();
        assert!(catalog
            .validate("todos.item", &json!({"_id": "1", "done": true, "extra": 1}))
            .is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn schema_count_limit_is_enforced() {
        let dir = make_temp_schema_dir("count-limit");
        write_schema(&dir, "a.schema.json", TODO_SCHEMA);
        write_schema(&dir, "b.schema.json", TODO_SCHEMA);

        let result = SchemaCatalog::from_directory_with_config(
            &dir,
            SchemaConfig {
                max_schemas_from_directory: 1,
                ..SchemaConfig::default()
            },
        );
        assert!(matches!(result, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn schema_file_size_limit_is_enforced() {
        let dir = make_temp_schema_dir("size-limit");
        write_schema(&dir, "a.schema.json", TODO_SCHEMA);

        let result = SchemaCatalog::from_directory_with_config(
            &dir,
            SchemaConfig {
                max_schema_file_size: 8,
                ..SchemaConfig::default()
            },
        );
        assert!(matches!(result, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_schema_is_rejected() {
        let dir = make_temp_schema_dir("symlink");
        let target = dir.join("target.json");
        std::fs::write(&target, TODO_SCHEMA.as_bytes()).unwrap();
        std::os::unix::fs::symlink(&target, dir.join("todos.item.schema.json")).unwrap();

        let result = SchemaCatalog::from_directory(&dir);
        assert!(matches!(result, Err(SchemaError::LoadFailed(_))));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_name_parsing() {
        assert_eq!(
            schema_name_from_file_name("todos.add.input.schema.json").unwrap(),
            Some("todos.add.input")
        );
        assert_eq!(schema_name_from_file_name("plain.json").unwrap(), None);
        assert!(matches!(
            schema_name_from_file_name(".schema.json"),
            Err(SchemaError::LoadFailed(_))
        ));
        assert!(matches!(
            schema_name_from_file_name("has space.schema.json"),
            Err(SchemaError::LoadFailed(_))
        ));
    }

    #[test]
    fn malformed_schema_file_name_fails_the_load() {
        let dir = make_temp_schema_dir("bad-name");
        write_schema(&dir, "todos.item.schema.json", TODO_SCHEMA);
        write_schema(&dir, "todos item.schema.json", TODO_SCHEMA);

        let err = SchemaCatalog::from_directory(&dir).err().unwrap();
        assert!(matches!(
            err,
            SchemaError::LoadFailed(ref message) if message.contains("todos item")
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn embedded_catalog_honours_strict_mode() {
        let catalog = SchemaCatalog::from_embedded_with_config(
            &[("todos.item", TODO_SCHEMA)],
            SchemaConfig {
                strict_mode: true,
                ..SchemaConfig::default()
            },
        )
        .unwrap();

        assert!(catalog.config().strict_mode);
        assert!(catalog
            .validate("todos.item", &json!({"_id": "1", "done": true, "extra": 1}))
            .is_err());
    }
}
