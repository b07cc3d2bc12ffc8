use serde::{Serialize, Deserialize};
use serde_json::Value;
use crate::error::{Error, Result};

/// Serialized form of any distribution or model: a kind tag, the dimension, the
/// variant parameters and, for composite objects, the records of the parts.
/// Accumulator state is never part of a record.
///
/// ```json
/// { "kind" : "Normal", "d" : 1, "parameters" : [0.0, 1.0] }
/// ```
///
/// Composite records list their parts under "components" (also accepted as
/// "distributions" or "states" when reading).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {

    pub kind : String,

    pub d : usize,

    #[serde(default)]
    pub parameters : Vec<Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty", alias = "distributions", alias = "states")]
    pub components : Vec<Record>

}

impl Record {

    pub fn new(kind : &str, d : usize, parameters : Vec<Value>) -> Self {
        Self { kind : kind.to_string(), d, parameters, components : Vec::new() }
    }

    pub fn with_components(mut self, components : Vec<Record>) -> Self {
        self.components = components;
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a record, mapping malformed documents to Schema errors.
    pub fn from_json(content : &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Schema(e.to_string()) )
    }

    pub(crate) fn expect_kind(&self, kind : &str) -> Result<()> {
        if self.kind == kind {
            Ok(())
        } else {
            Err(Error::Schema(format!("Expected {} record, found {}", kind, self.kind)))
        }
    }

    pub(crate) fn param(&self, ix : usize) -> Result<&Value> {
        self.parameters.get(ix)
            .ok_or_else(|| Error::Schema(format!("{} record lacks parameter {}", self.kind, ix)) )
    }

}

#[test]
fn record_aliases_are_accepted() {
    let rec = Record::from_json(r#"{
        "kind" : "GeneralMixtureModel",
        "d" : 1,
        "parameters" : [[0.5, 0.5]],
        "distributions" : [
            { "kind" : "Normal", "d" : 1, "parameters" : [0.0, 1.0] },
            { "kind" : "Normal", "d" : 1, "parameters" : [5.0, 1.0] }
        ]
    }"#).unwrap();
    assert_eq!(rec.components.len(), 2);
    assert_eq!(rec.components[1].parameters[0], serde_json::json!(5.0));
    assert!(matches!(Record::from_json("{ \"d\" : 1 }"), Err(Error::Schema(_))));
}
