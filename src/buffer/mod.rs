//! Parameter buffer: the persistent and volatile parameter sequences a
//! tracker serializes into hits.

pub mod context;
pub mod readonly;

use thiserror::Error;
use tracing::debug;

use crate::domain::{Param, ParamError, ParamInput, ParamOption};

pub use context::{ConnectionType, ContextProvider, DefaultContext, context_variables};
pub use readonly::{READ_ONLY_PARAMS, is_read_only};

/// Non-fatal outcome of a buffer mutation. The mutation is dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferWarning {
    #[error("Parameter {key} is read only. Value will not be updated")]
    ReadOnly { key: String },

    #[error(transparent)]
    Param(#[from] ParamError),
}

/// Two ordered parameter sequences.
///
/// `persistent` entries survive across hits; `volatile` entries are consumed
/// by the next built hit. Outside of `append`, a key has at most one entry
/// across both sequences.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    persistent: Vec<Param>,
    volatile: Vec<Param>,
}

impl Buffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer pre-filled with persistent context parameters.
    ///
    /// Seeded entries bypass the read-only check, they are the reason the
    /// check exists.
    pub fn seeded(context: Vec<Param>) -> Self {
        let mut buffer = Self::new();
        for mut param in context {
            param.options.persistent = true;
            buffer.apply(param);
        }
        buffer
    }

    pub fn set(&mut self, param: Param) -> Result<(), BufferWarning> {
        if is_read_only(&param.key) {
            return Err(BufferWarning::ReadOnly { key: param.key });
        }
        self.apply(param);
        Ok(())
    }

    /// Removes every entry for `key` from both sequences.
    pub fn unset(&mut self, key: &str) {
        let removed = take_key(&mut self.persistent, key).len() + take_key(&mut self.volatile, key).len();
        if removed > 0 {
            debug!("Unset parameter {} ({} entries)", key, removed);
        }
    }

    pub fn persistent(&self) -> &[Param] {
        &self.persistent
    }

    pub fn volatile(&self) -> &[Param] {
        &self.volatile
    }

    /// Persistent entries followed by volatile entries, in insertion order.
    pub fn params(&self) -> Vec<Param> {
        self.persistent.iter().chain(self.volatile.iter()).cloned().collect()
    }

    pub fn entries(&self, key: &str) -> Vec<&Param> {
        self.persistent
            .iter()
            .chain(self.volatile.iter())
            .filter(|param| param.key == key)
            .collect()
    }

    pub fn clear_volatile(&mut self) {
        self.volatile.clear();
    }

    pub fn len(&self) -> usize {
        self.persistent.len() + self.volatile.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(&mut self, param: Param) {
        let key = param.key.clone();
        let to_persistent = param.options.persistent;

        if param.options.append {
            // Earlier values follow the new entry into its sequence.
            let source = if to_persistent {
                &mut self.volatile
            } else {
                &mut self.persistent
            };
            let relocated = take_key(source, &key);
            let target = self.sequence_mut(to_persistent);
            for mut previous in relocated {
                previous.options.persistent = to_persistent;
                target.push(previous);
            }
            target.push(param);
            return;
        }

        let first = self
            .persistent
            .iter()
            .position(|p| p.key == key)
            .map(|index| (true, index))
            .or_else(|| {
                self.volatile
                    .iter()
                    .position(|p| p.key == key)
                    .map(|index| (false, index))
            });

        match first {
            Some((in_persistent, index)) if in_persistent == to_persistent => {
                take_key(self.sequence_mut(!to_persistent), &key);
                let target = self.sequence_mut(to_persistent);
                keep_only_at(target, &key, index);
                target[index] = param;
            }
            _ => {
                take_key(&mut self.persistent, &key);
                take_key(&mut self.volatile, &key);
                self.sequence_mut(to_persistent).push(param);
            }
        }
    }

    fn sequence_mut(&mut self, persistent: bool) -> &mut Vec<Param> {
        if persistent {
            &mut self.persistent
        } else {
            &mut self.volatile
        }
    }
}

/// Removes and returns every entry for `key`, preserving order.
fn take_key(sequence: &mut Vec<Param>, key: &str) -> Vec<Param> {
    let (matching, rest): (Vec<Param>, Vec<Param>) =
        std::mem::take(sequence).into_iter().partition(|param| param.key == key);
    *sequence = rest;
    matching
}

/// Drops duplicates of `key` other than the one at `index`. `index` must be
/// the first occurrence so it stays valid after the removal.
fn keep_only_at(sequence: &mut Vec<Param>, key: &str, index: usize) {
    let mut position = 0;
    sequence.retain(|param| {
        let keep = param.key != key || position == index;
        position += 1;
        keep
    });
}

/// Mutation handle handed to event producers while they populate a hit.
///
/// Warnings are collected instead of aborting, so one bad value only drops
/// that parameter.
pub struct BufferWriter<'a> {
    buffer: &'a mut Buffer,
    warnings: Vec<BufferWarning>,
}

impl<'a> BufferWriter<'a> {
    pub fn new(buffer: &'a mut Buffer) -> Self {
        Self {
            buffer,
            warnings: Vec::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<ParamInput>) -> &mut Self {
        self.set_with(key, value, ParamOption::default())
    }

    pub fn set_with(&mut self, key: &str, value: impl Into<ParamInput>, options: ParamOption) -> &mut Self {
        let outcome = value
            .into()
            .into_param(key, options)
            .map_err(BufferWarning::from)
            .and_then(|param| self.buffer.set(param));
        if let Err(warning) = outcome {
            self.warnings.push(warning);
        }
        self
    }

    pub fn unset(&mut self, key: &str) -> &mut Self {
        self.buffer.unset(key);
        self
    }

    pub fn warnings(&self) -> &[BufferWarning] {
        &self.warnings
    }

    pub fn finish(self) -> Vec<BufferWarning> {
        self.warnings
    }
}
