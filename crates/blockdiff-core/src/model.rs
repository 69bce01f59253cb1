//! Core data structures for block workspaces

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stable block identifier. Unique within one workspace; equal ids across
/// the two workspaces denote the same logical block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        BlockId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        BlockId(id.to_string())
    }
}

impl From<String> for BlockId {
    fn from(id: String) -> Self {
        BlockId(id)
    }
}

impl Borrow<str> for BlockId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Which of the two side-by-side workspaces something belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Mine,
    Previous,
}

impl Side {
    /// The workspace on the other side of the split view.
    pub fn other(self) -> Side {
        match self {
            Side::Mine => Side::Previous,
            Side::Previous => Side::Mine,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Mine => "mine",
            Side::Previous => "previous",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mine" => Ok(Side::Mine),
            "previous" => Ok(Side::Previous),
            other => Err(format!("unknown workspace side '{}'", other)),
        }
    }
}

/// Data-flow vs. control-flow connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionKind {
    /// Output plugged into a value input.
    Value,
    /// Statement sequencing: the block's own next slot or a statement input.
    NextStatement,
}

/// Shape of a block input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Value,
    Statement,
    /// Holds fields only, never a connection.
    #[default]
    Dummy,
}

impl InputKind {
    /// Kind of connection an input of this shape carries, if any.
    pub fn connection_kind(self) -> Option<ConnectionKind> {
        match self {
            InputKind::Value => Some(ConnectionKind::Value),
            InputKind::Statement => Some(ConnectionKind::NextStatement),
            InputKind::Dummy => None,
        }
    }
}

/// Named connection point on a source block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// The block's own next-statement connection.
    Next,
    /// A connection owned by the named input.
    Input(String),
}

impl Slot {
    pub fn input(name: impl Into<String>) -> Self {
        Slot::Input(name.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Slot::Next => "next",
            Slot::Input(name) => name,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Slot::Next => serializer.serialize_none(),
            Slot::Input(name) => serializer.serialize_some(name),
        }
    }
}

impl<'de> Deserialize<'de> for Slot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<String>::deserialize(deserializer)? {
            Some(name) => Slot::Input(name),
            None => Slot::Next,
        })
    }
}

/// 2D position in workspace coordinates (y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }
}

/// A named value on a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: serde_json::Value,
    /// Non-serializable fields (labels, images) never take part in diffing.
    pub serializable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, value: serde_json::Value) -> Self {
        Field {
            name: name.into(),
            value,
            serializable: true,
        }
    }

    pub fn label(name: impl Into<String>, text: impl Into<String>) -> Self {
        Field {
            name: name.into(),
            value: serde_json::Value::String(text.into()),
            serializable: false,
        }
    }
}

/// A connection endpoint owned by a source block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub kind: ConnectionKind,
    /// Attached block, or `None` when dangling.
    pub target: Option<BlockId>,
}

impl Connection {
    pub fn new(kind: ConnectionKind, target: Option<BlockId>) -> Self {
        Connection { kind, target }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    pub name: String,
    pub kind: InputKind,
    pub fields: Vec<Field>,
    pub connection: Option<Connection>,
}

impl Input {
    pub fn new(name: impl Into<String>, kind: InputKind) -> Self {
        Input {
            name: name.into(),
            kind,
            fields: Vec::new(),
            connection: kind.connection_kind().map(|k| Connection::new(k, None)),
        }
    }
}

/// A block node as owned by a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub block_type: String,
    pub position: Position,
    pub inputs: Vec<Input>,
    /// Present when the block's shape has a next-statement slot.
    pub next: Option<Connection>,
}

/// Borrowed view of one connection together with the slot it lives in.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionRef<'a> {
    pub input: Option<&'a str>,
    pub connection: &'a Connection,
}

impl ConnectionRef<'_> {
    pub fn slot(&self) -> Slot {
        match self.input {
            Some(name) => Slot::input(name),
            None => Slot::Next,
        }
    }
}

impl Block {
    /// A block with no inputs and no next slot.
    pub fn new(id: impl Into<BlockId>, block_type: impl Into<String>) -> Self {
        Block {
            id: id.into(),
            block_type: block_type.into(),
            position: Position::default(),
            inputs: Vec::new(),
            next: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Append a serializable field to the trailing dummy input, creating it
    /// if needed.
    pub fn with_field(self, name: &str, value: serde_json::Value) -> Self {
        self.with_field_def(Field::new(name, value))
    }

    pub fn with_field_def(mut self, field: Field) -> Self {
        match self.inputs.last_mut() {
            Some(input) if input.kind == InputKind::Dummy => input.fields.push(field),
            _ => {
                let mut input = Input::new("", InputKind::Dummy);
                input.fields.push(field);
                self.inputs.push(input);
            }
        }
        self
    }

    pub fn with_input(mut self, name: &str, kind: InputKind, target: Option<&str>) -> Self {
        let mut input = Input::new(name, kind);
        if let Some(connection) = input.connection.as_mut() {
            connection.target = target.map(BlockId::from);
        }
        self.inputs.push(input);
        self
    }

    pub fn with_statement(self, name: &str, target: Option<&str>) -> Self {
        self.with_input(name, InputKind::Statement, target)
    }

    pub fn with_value(self, name: &str, target: Option<&str>) -> Self {
        self.with_input(name, InputKind::Value, target)
    }

    /// Give the block a next slot, optionally attached.
    pub fn with_next(mut self, target: Option<&str>) -> Self {
        self.next = Some(Connection::new(
            ConnectionKind::NextStatement,
            target.map(BlockId::from),
        ));
        self
    }

    /// Every connection the block owns: input connections in input order,
    /// then the next slot.
    pub fn connections(&self) -> impl Iterator<Item = ConnectionRef<'_>> {
        self.inputs
            .iter()
            .filter_map(|input| {
                input.connection.as_ref().map(|connection| ConnectionRef {
                    input: Some(input.name.as_str()),
                    connection,
                })
            })
            .chain(self.next.iter().map(|connection| ConnectionRef {
                input: None,
                connection,
            }))
    }

    /// The connection living in `slot`, if the shape has one.
    pub fn connection(&self, slot: &Slot) -> Option<&Connection> {
        match slot {
            Slot::Next => self.next.as_ref(),
            Slot::Input(name) => self
                .inputs
                .iter()
                .find(|i| &i.name == name)
                .and_then(|i| i.connection.as_ref()),
        }
    }

    pub fn connection_mut(&mut self, slot: &Slot) -> Option<&mut Connection> {
        match slot {
            Slot::Next => self.next.as_mut(),
            Slot::Input(name) => self
                .inputs
                .iter_mut()
                .find(|i| &i.name == name)
                .and_then(|i| i.connection.as_mut()),
        }
    }

    /// Iterate fields across all inputs in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.inputs.iter().flat_map(|input| input.fields.iter())
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields().find(|f| f.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.inputs
            .iter_mut()
            .flat_map(|input| input.fields.iter_mut())
            .find(|f| f.name == name)
    }
}
