//! Block shape catalog
//!
//! The editor's JSON format only records what a block holds, not what it
//! could hold: empty inputs, the next slot and non-serializable fields are
//! absent. Shapes fill that gap when a document is loaded.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::CatalogError;
use crate::model::{Block, Field, Input, InputKind};

const BUILTIN_CATALOG: &str = include_str!("../catalog/blocks.toml");

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldShape {
    pub name: String,
    #[serde(default = "default_true")]
    pub serializable: bool,
    /// Initial value; for non-serializable fields this is the only value.
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InputShape {
    pub name: String,
    pub kind: InputKind,
    #[serde(default)]
    pub fields: Vec<FieldShape>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BlockShape {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default = "default_true")]
    pub next: bool,
    /// Fields outside any named input; they live in a leading dummy input.
    #[serde(default)]
    pub fields: Vec<FieldShape>,
    #[serde(default)]
    pub inputs: Vec<InputShape>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "block")]
    blocks: Vec<BlockShape>,
}

/// Block shapes keyed by block type.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    shapes: HashMap<String, BlockShape>,
}

impl Catalog {
    pub fn empty() -> Self {
        Catalog {
            shapes: HashMap::new(),
        }
    }

    /// The stock block set shipped with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn from_toml_str(source: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(source)?;
        let shapes = file
            .blocks
            .into_iter()
            .map(|shape| (shape.block_type.clone(), shape))
            .collect();
        Ok(Catalog { shapes })
    }

    /// Load a user catalog file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let source = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_toml_str(&source)?;
        debug!("Loaded {} block shapes from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Built-in shapes overlaid with the ones in `path`, if given.
    pub fn with_overrides(path: Option<&Path>) -> Result<Self, CatalogError> {
        let mut catalog = Self::builtin()?;
        if let Some(path) = path {
            catalog.merge(Self::load(path)?);
        }
        Ok(catalog)
    }

    /// Shapes in `other` replace same-typed shapes in `self`.
    pub fn merge(&mut self, other: Catalog) {
        self.shapes.extend(other.shapes);
    }

    pub fn shape(&self, block_type: &str) -> Option<&BlockShape> {
        self.shapes.get(block_type)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Kind of the named input on a block type. Mutator-generated inputs
    /// (`DO1`, `ADD3`) resolve through a declared input with the same
    /// alphabetic prefix.
    pub fn input_kind(&self, block_type: &str, input: &str) -> Option<InputKind> {
        let shape = self.shape(block_type)?;
        if let Some(found) = shape.inputs.iter().find(|i| i.name == input) {
            return Some(found.kind);
        }
        let prefix = input.trim_end_matches(|c: char| c.is_ascii_digit());
        if prefix.len() == input.len() {
            return None;
        }
        shape
            .inputs
            .iter()
            .find(|i| i.name.trim_end_matches(|c: char| c.is_ascii_digit()) == prefix)
            .map(|i| i.kind)
    }

    /// A block with every input, field and slot its type declares. Unknown
    /// types produce a bare block with a next slot.
    pub fn instantiate(&self, id: &str, block_type: &str) -> Block {
        let mut block = Block::new(id, block_type);
        let Some(shape) = self.shape(block_type) else {
            debug!("No shape for block type '{}', inferring from document", block_type);
            return block.with_next(None);
        };

        if !shape.fields.is_empty() {
            let mut dummy = Input::new("", InputKind::Dummy);
            dummy.fields = shape.fields.iter().map(field_from_shape).collect();
            block.inputs.push(dummy);
        }
        for input_shape in &shape.inputs {
            let mut input = Input::new(input_shape.name.as_str(), input_shape.kind);
            input.fields = input_shape.fields.iter().map(field_from_shape).collect();
            block.inputs.push(input);
        }
        if shape.next {
            block = block.with_next(None);
        }
        block
    }
}

fn field_from_shape(shape: &FieldShape) -> Field {
    Field {
        name: shape.name.clone(),
        value: shape.value.clone(),
        serializable: shape.serializable,
    }
}

/// Built-in catalog, or an empty one if the embedded TOML fails to parse.
pub fn builtin_or_empty() -> Catalog {
    Catalog::builtin().unwrap_or_else(|e| {
        warn!("Built-in block catalog is invalid: {}", e);
        Catalog::empty()
    })
}
