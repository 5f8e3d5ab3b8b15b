//! Registry of named custom commands.
//!
//! Each operation name maps to one or more handlers, each with an explicit
//! [`Signature`]. When an invocation carries an originator, the handler
//! whose signature also takes the originator is preferred; otherwise the
//! plain signature is used.
//!
//! ```rust
//! use sitewhere_client::{CommandRegistry, Signature, Transport};
//! use sitewhere_protocol::ArgKind;
//!
//! struct Screen { color: String }
//!
//! let mut registry = CommandRegistry::<Screen>::new();
//! registry
//!     .register(
//!         "changeBackground",
//!         Signature::new([ArgKind::Text]).with_originator(),
//!         |screen: &mut Screen, _t: &mut dyn Transport, call| {
//!             screen.color = call.arg::<String>(0)?;
//!             Ok(())
//!         },
//!     )
//!     .unwrap();
//! assert!(registry.contains("changeBackground"));
//! ```

use std::collections::HashMap;
use std::fmt;

use sitewhere_protocol::{ArgKind, ArgumentValue, Invocation};
use tracing::debug;

use crate::error::DispatchError;
use crate::transport::Transport;

/// Argument kinds a handler accepts, and whether it takes the originator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub args: Vec<ArgKind>,
    pub originator: bool,
}

impl Signature {
    pub fn new(args: impl IntoIterator<Item = ArgKind>) -> Self {
        Self {
            args: args.into_iter().collect(),
            originator: false,
        }
    }

    /// Signature with no arguments.
    pub fn empty() -> Self {
        Self::new([])
    }

    /// Builder: handler also receives the originator.
    pub fn with_originator(mut self) -> Self {
        self.originator = true;
        self
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, kind) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", kind)?;
        }
        if self.originator {
            if !self.args.is_empty() {
                f.write_str(", ")?;
            }
            f.write_str("originator")?;
        }
        f.write_str(")")
    }
}

/// Rust types that can be taken out of an [`ArgumentValue`].
pub trait FromArgument: Sized {
    const KIND: ArgKind;

    fn from_argument(value: &ArgumentValue) -> Option<Self>;
}

impl FromArgument for String {
    const KIND: ArgKind = ArgKind::Text;

    fn from_argument(value: &ArgumentValue) -> Option<Self> {
        match value {
            ArgumentValue::Text(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromArgument for i64 {
    const KIND: ArgKind = ArgKind::Integer;

    fn from_argument(value: &ArgumentValue) -> Option<Self> {
        match value {
            ArgumentValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

impl FromArgument for f64 {
    const KIND: ArgKind = ArgKind::Number;

    fn from_argument(value: &ArgumentValue) -> Option<Self> {
        match value {
            ArgumentValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl FromArgument for bool {
    const KIND: ArgKind = ArgKind::Flag;

    fn from_argument(value: &ArgumentValue) -> Option<Self> {
        match value {
            ArgumentValue::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromArgument for Vec<u8> {
    const KIND: ArgKind = ArgKind::Bytes;

    fn from_argument(value: &ArgumentValue) -> Option<Self> {
        match value {
            ArgumentValue::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }
}

/// A resolved invocation as seen by a handler.
#[derive(Debug, Clone, Copy)]
pub struct CommandCall<'a> {
    pub name: &'a str,
    pub arguments: &'a [ArgumentValue],
    /// Present only when the matched signature takes the originator.
    pub originator: Option<&'a str>,
}

impl CommandCall<'_> {
    /// Typed access to the argument at `index`.
    pub fn arg<T: FromArgument>(&self, index: usize) -> Result<T, DispatchError> {
        let value = self.arguments.get(index).ok_or_else(|| {
            DispatchError::handler(self.name, format!("missing argument {}", index))
        })?;
        T::from_argument(value).ok_or_else(|| DispatchError::ArgumentType {
            name: self.name.to_string(),
            index,
            expected: T::KIND,
            found: value.kind(),
        })
    }
}

/// Handler closure for a named command.
pub type CommandHandler<H> =
    Box<dyn FnMut(&mut H, &mut dyn Transport, CommandCall<'_>) -> Result<(), DispatchError>>;

struct Registration<H> {
    signature: Signature,
    handler: CommandHandler<H>,
}

/// Maps operation names to typed handlers over host state `H`.
pub struct CommandRegistry<H> {
    commands: HashMap<String, Vec<Registration<H>>>,
}

impl<H> Default for CommandRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> fmt::Debug for CommandRegistry<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, registrations) in &self.commands {
            let signatures: Vec<String> = registrations
                .iter()
                .map(|r| r.signature.to_string())
                .collect();
            map.entry(name, &signatures);
        }
        map.finish()
    }
}

impl<H> CommandRegistry<H> {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Registers `handler` for `name` with the given signature.
    ///
    /// Fails if a handler with an identical signature already exists.
    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        signature: Signature,
        handler: F,
    ) -> Result<&mut Self, RegistryError>
    where
        F: FnMut(&mut H, &mut dyn Transport, CommandCall<'_>) -> Result<(), DispatchError>
            + 'static,
    {
        let name = name.into();
        let entries = self.commands.entry(name.clone()).or_default();
        if entries.iter().any(|r| r.signature == signature) {
            return Err(RegistryError::Duplicate { name, signature });
        }

        debug!(command = %name, signature = %signature, "registered custom command");
        entries.push(Registration {
            signature,
            handler: Box::new(handler),
        });
        Ok(self)
    }

    /// Returns true if any handler is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// Registered operation names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// Resolves `invocation` to a handler and runs it.
    pub fn dispatch(
        &mut self,
        host: &mut H,
        transport: &mut dyn Transport,
        invocation: &Invocation,
    ) -> Result<(), DispatchError> {
        let name = invocation.name.as_str();
        let registrations =
            self.commands
                .get_mut(name)
                .ok_or_else(|| DispatchError::UnknownOperation {
                    name: name.to_string(),
                })?;

        let kinds = invocation.kinds();
        let has_originator = invocation.originator.is_some();

        let with_originator = has_originator
            .then(|| {
                registrations
                    .iter()
                    .position(|r| r.signature.originator && r.signature.args == kinds)
            })
            .flatten();
        let selected = with_originator.or_else(|| {
            registrations
                .iter()
                .position(|r| !r.signature.originator && r.signature.args == kinds)
        });

        let Some(index) = selected else {
            return Err(mismatch(name, registrations, kinds, has_originator));
        };

        let registration = &mut registrations[index];
        let call = CommandCall {
            name,
            arguments: &invocation.arguments,
            originator: if registration.signature.originator {
                invocation.originator.as_deref()
            } else {
                None
            },
        };

        debug!(
            command = %name,
            signature = %registration.signature,
            originator = invocation.originator.as_deref().unwrap_or_default(),
            "dispatching custom command"
        );
        (registration.handler)(host, transport, call)
    }
}

/// Explains why no registration matched: a same-arity signature with a
/// different argument type is reported as a type error.
fn mismatch<H>(
    name: &str,
    registrations: &[Registration<H>],
    found: Vec<ArgKind>,
    originator: bool,
) -> DispatchError {
    let candidate = registrations
        .iter()
        .filter(|r| r.signature.args.len() == found.len())
        .find(|r| originator || !r.signature.originator);

    if let Some(candidate) = candidate
        && let Some(index) = candidate
            .signature
            .args
            .iter()
            .zip(&found)
            .position(|(expected, actual)| expected != actual)
    {
        return DispatchError::ArgumentType {
            name: name.to_string(),
            index,
            expected: candidate.signature.args[index],
            found: found[index],
        };
    }

    DispatchError::NoMatchingSignature {
        name: name.to_string(),
        found,
        originator,
    }
}

/// Errors raised while building a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("command {name} already has a handler for {signature}")]
    Duplicate { name: String, signature: Signature },
}
