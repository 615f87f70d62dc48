//! Form controls and the generic edit helpers.
//!
//! A control is bound to a dotted path into the record document, such as
//! `summary` or `location.name`. Editing a control sends a partial document
//! containing only that path:
//!
//! ```text
//! location.name = "Camp"  ->  {"location": {"name": "Camp"}}
//! ```

use {
    async_trait::async_trait,
    serde_json::{Map, Value},
    tracing::{debug, warn},
};

use crate::{error::PageError, notices::Notices};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlState {
    #[default]
    Idle,
    /// The last submission failed.
    Invalid,
    /// The last submission succeeded.
    Saved,
}

#[derive(Debug, Clone)]
pub struct FieldControl {
    path: String,
    value: Value,
    state: ControlState,
}

impl FieldControl {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
            state: ControlState::Idle,
        }
    }

    /// A control showing `path` of a record document.
    pub fn bind(path: impl Into<String>, document: &Value) -> Self {
        let path = path.into();
        let value = lookup(document, &path);
        Self::new(path, value)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    /// Show the value from a freshly loaded document.
    pub fn refresh(&mut self, document: &Value) {
        self.value = lookup(document, &self.path);
    }
}

/// Value at a dotted path, `null` when absent.
pub fn lookup(document: &Value, path: &str) -> Value {
    path.split('.')
        .try_fold(document, |node, key| node.get(key))
        .cloned()
        .unwrap_or(Value::Null)
}

/// The partial document setting `path` to `value`.
pub fn nested_edit(path: &str, value: Value) -> Value {
    path.rsplit('.').fold(value, |inner, key| {
        let mut object = Map::new();
        object.insert(key.to_string(), inner);
        Value::Object(object)
    })
}

/// Merge `patch` into `target`, recursing into objects; other values replace.
pub fn merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                merge(target.entry(key).or_insert(Value::Null), value);
            }
        },
        (target, patch) => *target = patch,
    }
}

/// Something that can persist edits to the record on display.
#[async_trait]
pub trait EditSubmitter: Send {
    /// Submit a partial document and read the record back on success.
    async fn send_edits(&mut self, edits: Value) -> Result<(), PageError>;

    async fn strike(&mut self, entry_id: u64, stricken: bool) -> Result<(), PageError>;

    /// Called after a report entry was struck or restored.
    async fn on_strike_success(&mut self) -> Result<(), PageError>;
}

/// Submit a new value for one control.
///
/// Returns `Ok(false)` without a request when the value is unchanged.
pub async fn edit_field<S>(
    submitter: &mut S,
    notices: &Notices,
    control: &mut FieldControl,
    value: Value,
) -> Result<bool, PageError>
where
    S: EditSubmitter + ?Sized,
{
    if control.value == value {
        debug!(path = %control.path, "value unchanged, not submitting");
        return Ok(false);
    }
    let edits = nested_edit(&control.path, value.clone());
    match submitter.send_edits(edits).await {
        Ok(()) => {
            control.value = value;
            control.state = ControlState::Saved;
            notices.clear_error();
            Ok(true)
        },
        Err(e) => {
            warn!(path = %control.path, error = %e, "edit rejected");
            control.state = ControlState::Invalid;
            notices.set_error(format!("Unable to save {}: {e}", control.path));
            Err(e)
        },
    }
}

pub async fn set_stricken<S>(
    submitter: &mut S,
    notices: &Notices,
    entry_id: u64,
    stricken: bool,
) -> Result<(), PageError>
where
    S: EditSubmitter + ?Sized,
{
    if let Err(e) = submitter.strike(entry_id, stricken).await {
        notices.set_error(format!("Unable to update report entry {entry_id}: {e}"));
        return Err(e);
    }
    notices.clear_error();
    submitter.on_strike_success().await
}
