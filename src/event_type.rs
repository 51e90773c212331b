//! Event types and the type registry.
//!
//! An event type pairs a name with an ordered argument schema and a class
//! (instance or scope). Types are registered once per trace, either
//! programmatically or through the in-stream define record, and referenced
//! by integer id thereafter. The registry also owns each type's compiled
//! argument decoder so it is built exactly once.

use crate::codec::CompiledArgDecoder;
use crate::error::{Error, Result};
use crate::types::{type_flags, EventClass, TypeId, FIRST_USER_TYPE_ID};
use rustc_hash::FxHashMap;

/// Built-in control record type ids.
///
/// These are pre-registered in every registry and consumed by the stream
/// decoder; they never appear as stored events.
pub mod builtin {
    use crate::types::TypeId;

    /// Defines a new event type: `uint16 wireId, uint8 eventClass,
    /// uint32 flags, ascii name, ascii args`.
    pub const DEFINE_EVENT: TypeId = 1;
    /// Creates a zone: `uint16 zoneId, ascii name, ascii type, ascii location`.
    pub const CREATE_ZONE: TypeId = 2;
    /// Sets the zone subsequent events are attributed to: `uint16 zoneId`.
    pub const SET_ZONE: TypeId = 3;
    /// Closes the innermost open scope at the record's time. No args.
    pub const LEAVE_SCOPE: TypeId = 4;
    /// Shallow-merges a key/value pair into the innermost open scope's
    /// argument data: `ascii key, utf8 value`.
    pub const APPEND_SCOPE_DATA: TypeId = 5;
}

/// Wire format of one argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// 1 signed byte.
    Int8,
    /// 2-byte signed big-endian integer.
    Int16,
    /// 4-byte signed big-endian integer.
    Int32,
    /// 1 unsigned byte.
    Uint8,
    /// 2-byte unsigned big-endian integer.
    Uint16,
    /// 4-byte unsigned big-endian integer.
    Uint32,
    /// 4-byte big-endian IEEE-754 float.
    Float32,
    /// Flow id, carried as uint32.
    FlowId,
    /// Length-prefixed ASCII string.
    Ascii,
    /// Length-prefixed UTF-8 string.
    Utf8,
    /// Count-prefixed byte array (`uint8[]`).
    ByteArray,
}

impl ArgKind {
    /// Byte width on the wire, or `None` for variable-width kinds.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            ArgKind::Int8 | ArgKind::Uint8 => Some(1),
            ArgKind::Int16 | ArgKind::Uint16 => Some(2),
            ArgKind::Int32 | ArgKind::Uint32 | ArgKind::Float32 | ArgKind::FlowId => Some(4),
            ArgKind::Ascii | ArgKind::Utf8 | ArgKind::ByteArray => None,
        }
    }

    /// Parse a signature type token (`"uint32"`, `"ascii"`, `"uint8[]"`, ...).
    pub fn parse(token: &str) -> Result<ArgKind> {
        match token {
            "int8" => Ok(ArgKind::Int8),
            "int16" => Ok(ArgKind::Int16),
            "int32" => Ok(ArgKind::Int32),
            "uint8" => Ok(ArgKind::Uint8),
            "uint16" => Ok(ArgKind::Uint16),
            "uint32" => Ok(ArgKind::Uint32),
            "float" | "float32" => Ok(ArgKind::Float32),
            "flowId" => Ok(ArgKind::FlowId),
            "ascii" => Ok(ArgKind::Ascii),
            "utf8" => Ok(ArgKind::Utf8),
            "uint8[]" => Ok(ArgKind::ByteArray),
            other => Err(Error::InvalidSignature(format!(
                "unknown argument type {other:?}"
            ))),
        }
    }
}

/// One named argument in an event type's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    /// Argument name, used as the key in decoded argument data.
    pub name: String,
    /// Wire format of the argument.
    pub kind: ArgKind,
}

impl Argument {
    /// Create an argument.
    pub fn new(name: impl Into<String>, kind: ArgKind) -> Self {
        Argument {
            name: name.into(),
            kind,
        }
    }
}

/// A registered event type: name, class, flags and argument schema.
#[derive(Debug, Clone, PartialEq)]
pub struct EventType {
    /// Fully qualified name, conventionally `provider#event`.
    pub name: String,
    /// Instance or scope.
    pub class: EventClass,
    /// Bitmask of [`type_flags`] values.
    pub flags: u32,
    /// Ordered argument schema.
    pub args: Vec<Argument>,
}

impl EventType {
    /// Create an instance type with no arguments.
    pub fn instance(name: impl Into<String>) -> Self {
        EventType {
            name: name.into(),
            class: EventClass::Instance,
            flags: 0,
            args: Vec::new(),
        }
    }

    /// Create a scope type with no arguments.
    pub fn scope(name: impl Into<String>) -> Self {
        EventType {
            name: name.into(),
            class: EventClass::Scope,
            flags: 0,
            args: Vec::new(),
        }
    }

    /// Attach an argument schema.
    pub fn with_args(mut self, args: Vec<Argument>) -> Self {
        self.args = args;
        self
    }

    /// Attach behavior flags.
    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Parse a full signature such as `"my.provider#draw(uint32 count,
    /// ascii name)"`. The argument list may be omitted entirely.
    pub fn parse(class: EventClass, signature: &str) -> Result<EventType> {
        let signature = signature.trim();
        let (name, args) = match signature.find('(') {
            None => (signature, Vec::new()),
            Some(open) => {
                let close = signature.rfind(')').ok_or_else(|| {
                    Error::InvalidSignature(format!("unterminated argument list in {signature:?}"))
                })?;
                if close < open {
                    return Err(Error::InvalidSignature(format!(
                        "unterminated argument list in {signature:?}"
                    )));
                }
                (
                    signature[..open].trim_end(),
                    parse_signature_args(&signature[open + 1..close])?,
                )
            }
        };
        if name.is_empty() {
            return Err(Error::InvalidSignature("empty event name".to_string()));
        }
        Ok(EventType {
            name: name.to_string(),
            class,
            flags: 0,
            args,
        })
    }

    /// The provider portion of the name (everything before `#`), or the
    /// whole name if it has no provider prefix.
    pub fn provider(&self) -> &str {
        provider_of(&self.name)
    }
}

/// The provider portion of an event name.
pub fn provider_of(name: &str) -> &str {
    match name.find('#') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Parse a comma-separated signature argument list such as
/// `"uint32 count, ascii name"`. An empty string yields no arguments.
pub fn parse_signature_args(list: &str) -> Result<Vec<Argument>> {
    let list = list.trim();
    if list.is_empty() {
        return Ok(Vec::new());
    }
    let mut args = Vec::new();
    for part in list.split(',') {
        let mut tokens = part.split_whitespace();
        let kind = tokens
            .next()
            .ok_or_else(|| Error::InvalidSignature(format!("empty argument in {list:?}")))?;
        let name = tokens
            .next()
            .ok_or_else(|| Error::InvalidSignature(format!("argument {kind:?} has no name")))?;
        if tokens.next().is_some() {
            return Err(Error::InvalidSignature(format!(
                "trailing tokens after argument name in {part:?}"
            )));
        }
        args.push(Argument::new(name, ArgKind::parse(kind)?));
    }
    Ok(args)
}

struct RegisteredType {
    ty: EventType,
    decoder: CompiledArgDecoder,
}

/// Id-addressed table of all event types registered for a trace.
pub struct EventTypeRegistry {
    slots: Vec<Option<RegisteredType>>,
    by_name: FxHashMap<String, TypeId>,
    next_user: TypeId,
}

impl EventTypeRegistry {
    /// Create a registry with the built-in control record types
    /// pre-registered.
    pub fn new() -> Self {
        let mut registry = EventTypeRegistry {
            slots: Vec::new(),
            by_name: FxHashMap::default(),
            next_user: FIRST_USER_TYPE_ID,
        };
        for (id, ty) in builtin_types() {
            registry
                .register_at(id, ty)
                .expect("built-in registration cannot conflict");
        }
        registry
    }

    /// Register a type at the next free user id. Re-registering an
    /// identical type returns the existing id; a conflicting redefinition
    /// is a [`Error::MalformedRecord`].
    pub fn define(&mut self, ty: EventType) -> Result<TypeId> {
        if let Some(&existing) = self.by_name.get(&ty.name) {
            return self.check_redefinition(existing, &ty);
        }
        while self.slot(self.next_user).is_some() {
            self.next_user += 1;
        }
        let id = self.next_user;
        self.next_user += 1;
        self.register_at(id, ty)
    }

    /// Register a type at an explicit wire id (the define control record).
    pub fn define_at(&mut self, id: TypeId, ty: EventType) -> Result<TypeId> {
        if id < FIRST_USER_TYPE_ID {
            return Err(Error::MalformedRecord(format!(
                "event type id {id} is reserved for built-ins"
            )));
        }
        if self.slot(id).is_some() {
            return self.check_redefinition(id, &ty);
        }
        if let Some(&existing) = self.by_name.get(&ty.name) {
            if existing != id {
                return Err(Error::MalformedRecord(format!(
                    "event type {:?} already registered with id {existing}",
                    ty.name
                )));
            }
        }
        self.register_at(id, ty)
    }

    /// Look up a type by id.
    pub fn get(&self, id: TypeId) -> Option<&EventType> {
        self.slot(id).map(|r| &r.ty)
    }

    /// Look up a type's compiled argument decoder by id.
    pub fn decoder(&self, id: TypeId) -> Option<&CompiledArgDecoder> {
        self.slot(id).map(|r| &r.decoder)
    }

    /// Look up a type by name.
    pub fn get_by_name(&self, name: &str) -> Option<(TypeId, &EventType)> {
        let id = *self.by_name.get(name)?;
        Some((id, self.get(id)?))
    }

    /// Iterate all registered types in id order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &EventType)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| Some((id as TypeId, &slot.as_ref()?.ty)))
    }

    fn slot(&self, id: TypeId) -> Option<&RegisteredType> {
        self.slots.get(id as usize).and_then(|s| s.as_ref())
    }

    fn check_redefinition(&self, existing: TypeId, ty: &EventType) -> Result<TypeId> {
        let current = self.get(existing).expect("by_name entry must have a slot");
        if current == ty {
            Ok(existing)
        } else {
            Err(Error::MalformedRecord(format!(
                "conflicting redefinition of event type {:?}",
                ty.name
            )))
        }
    }

    fn register_at(&mut self, id: TypeId, ty: EventType) -> Result<TypeId> {
        if self.slots.len() <= id as usize {
            self.slots.resize_with(id as usize + 1, || None);
        }
        tracing::debug!(name = %ty.name, id, "registered event type");
        self.by_name.insert(ty.name.clone(), id);
        let decoder = CompiledArgDecoder::compile(&ty);
        self.slots[id as usize] = Some(RegisteredType { ty, decoder });
        Ok(id)
    }
}

impl Default for EventTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_types() -> Vec<(TypeId, EventType)> {
    let builtin = |name: &str, args: &str| {
        EventType::parse(EventClass::Instance, &format!("{name}({args})"))
            .expect("built-in signatures are valid")
            .with_flags(type_flags::BUILTIN)
    };
    vec![
        (
            builtin::DEFINE_EVENT,
            builtin(
                "trace.event#define",
                "uint16 wireId, uint8 eventClass, uint32 flags, ascii name, ascii args",
            ),
        ),
        (
            builtin::CREATE_ZONE,
            builtin(
                "trace.zone#create",
                "uint16 zoneId, ascii name, ascii type, ascii location",
            ),
        ),
        (builtin::SET_ZONE, builtin("trace.zone#set", "uint16 zoneId")),
        (builtin::LEAVE_SCOPE, builtin("trace.scope#leave", "")),
        (
            builtin::APPEND_SCOPE_DATA,
            builtin("trace.scope#appendData", "ascii key, utf8 value"),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signature_with_args() {
        let ty = EventType::parse(EventClass::Scope, "my.app#draw(uint32 count, ascii name)")
            .unwrap();
        assert_eq!(ty.name, "my.app#draw");
        assert_eq!(ty.provider(), "my.app");
        assert_eq!(ty.class, EventClass::Scope);
        assert_eq!(
            ty.args,
            vec![
                Argument::new("count", ArgKind::Uint32),
                Argument::new("name", ArgKind::Ascii),
            ]
        );
    }

    #[test]
    fn test_parse_signature_without_args() {
        let ty = EventType::parse(EventClass::Instance, "tick").unwrap();
        assert!(ty.args.is_empty());
        assert_eq!(ty.provider(), "tick");
    }

    #[test]
    fn test_parse_rejects_bad_signatures() {
        assert!(EventType::parse(EventClass::Instance, "x(uint32").is_err());
        assert!(EventType::parse(EventClass::Instance, "(uint32 a)").is_err());
        assert!(EventType::parse(EventClass::Instance, "x(wat a)").is_err());
        assert!(EventType::parse(EventClass::Instance, "x(uint32 a b)").is_err());
    }

    #[test]
    fn test_define_assigns_user_ids() {
        let mut registry = EventTypeRegistry::new();
        let a = registry.define(EventType::instance("a")).unwrap();
        let b = registry.define(EventType::instance("b")).unwrap();
        assert_eq!(a, FIRST_USER_TYPE_ID);
        assert_eq!(b, FIRST_USER_TYPE_ID + 1);
        assert_eq!(registry.get_by_name("a").unwrap().0, a);
    }

    #[test]
    fn test_identical_redefinition_is_idempotent() {
        let mut registry = EventTypeRegistry::new();
        let a = registry.define(EventType::instance("a")).unwrap();
        let again = registry.define(EventType::instance("a")).unwrap();
        assert_eq!(a, again);
    }

    #[test]
    fn test_conflicting_redefinition_fails() {
        let mut registry = EventTypeRegistry::new();
        registry.define(EventType::instance("a")).unwrap();
        let err = registry.define(EventType::scope("a")).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[test]
    fn test_define_at_rejects_reserved_ids() {
        let mut registry = EventTypeRegistry::new();
        let err = registry.define_at(3, EventType::instance("x")).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord(_)));
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = EventTypeRegistry::new();
        let (id, ty) = registry.get_by_name("trace.scope#leave").unwrap();
        assert_eq!(id, builtin::LEAVE_SCOPE);
        assert!(ty.args.is_empty());
        assert_ne!(ty.flags & type_flags::BUILTIN, 0);
    }
}
