use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::{
    fmt::{self, Debug, Display, Formatter},
    hash::{Hash, Hasher},
    sync::Arc,
};

pub mod compat;

/// The primitive kinds of the semantic-type vocabulary.
///
/// `Long` and `Double` are the wide kinds: they occupy two slots in an
/// invocation layout, everything else occupies one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrimKind {
    Bool,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimKind {
    pub const ALL: [PrimKind; 8] = [
        PrimKind::Bool,
        PrimKind::Byte,
        PrimKind::Short,
        PrimKind::Char,
        PrimKind::Int,
        PrimKind::Long,
        PrimKind::Float,
        PrimKind::Double,
    ];

    /// Slot width in the invocation layout: two for wide kinds, one otherwise.
    pub fn slot_width(self) -> usize {
        if self.is_wide() {
            2
        } else {
            1
        }
    }

    pub fn is_wide(self) -> bool {
        matches!(self, PrimKind::Long | PrimKind::Double)
    }

    pub fn is_floating(self) -> bool {
        matches!(self, PrimKind::Float | PrimKind::Double)
    }

    pub fn is_integral(self) -> bool {
        !self.is_floating()
    }

    /// Bit width of the raw representation.
    pub fn bit_width(self) -> usize {
        match self {
            PrimKind::Bool => 1,
            PrimKind::Byte => 8,
            PrimKind::Short | PrimKind::Char => 16,
            PrimKind::Int | PrimKind::Float => 32,
            PrimKind::Long | PrimKind::Double => 64,
        }
    }

    /// The canonical raw kind this kind collapses to when primitives are
    /// "forgotten" down to int/long: one-slot kinds become `Int`, two-slot
    /// kinds become `Long`.
    pub fn as_raw(self) -> PrimKind {
        if self.is_wide() {
            PrimKind::Long
        } else {
            PrimKind::Int
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PrimKind::Bool => "bool",
            PrimKind::Byte => "byte",
            PrimKind::Short => "short",
            PrimKind::Char => "char",
            PrimKind::Int => "int",
            PrimKind::Long => "long",
            PrimKind::Float => "float",
            PrimKind::Double => "double",
        }
    }

    fn wrapper_name(self) -> &'static str {
        match self {
            PrimKind::Bool => "Boolean",
            PrimKind::Byte => "Byte",
            PrimKind::Short => "Short",
            PrimKind::Char => "Character",
            PrimKind::Int => "Integer",
            PrimKind::Long => "Long",
            PrimKind::Float => "Float",
            PrimKind::Double => "Double",
        }
    }
}

/// What kind of class a [`ClassRef`] denotes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClassKind {
    /// An ordinary reference class.
    Plain,
    /// The wrapper class for one primitive kind.
    Wrapper(PrimKind),
    /// An array class; the payload is the element type.
    Array(SemanticType),
}

struct ClassData {
    name: String,
    superclass: Option<ClassRef>,
    kind: ClassKind,
}

/// An interned reference-class handle.
///
/// Classes form a single-superclass chain rooted at [`object_class`].
/// Interning makes equality by name and identity coincide, so shapes built
/// from the same names share the same class handles.
#[derive(Clone)]
pub struct ClassRef(Arc<ClassData>);

impl ClassRef {
    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn superclass(&self) -> Option<&ClassRef> {
        self.0.superclass.as_ref()
    }

    pub fn kind(&self) -> &ClassKind {
        &self.0.kind
    }

    pub fn is_object(&self) -> bool {
        Arc::ptr_eq(&self.0, &object_class().0)
    }

    pub fn wrapped_prim(&self) -> Option<PrimKind> {
        match self.0.kind {
            ClassKind::Wrapper(k) => Some(k),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&SemanticType> {
        match &self.0.kind {
            ClassKind::Array(t) => Some(t),
            _ => None,
        }
    }

    /// Widening reference assignability: may a value of `other` stand in for
    /// `self` with no runtime action? Walks the superclass chain; arrays are
    /// assignable only to themselves and to `Object`.
    pub fn is_assignable_from(&self, other: &ClassRef) -> bool {
        let mut cursor = Some(other);
        while let Some(c) = cursor {
            if self == c {
                return true;
            }
            cursor = c.superclass();
        }
        false
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        // Interned per name, so pointer equality is name equality.
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ClassRef {}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl Debug for ClassRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({})", self.0.name)
    }
}

impl Display for ClassRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

static CLASSES: Lazy<DashMap<String, ClassRef>> = Lazy::new(DashMap::new);

static OBJECT: Lazy<ClassRef> = Lazy::new(|| {
    let c = ClassRef(Arc::new(ClassData {
        name: "Object".to_string(),
        superclass: None,
        kind: ClassKind::Plain,
    }));
    CLASSES.insert(c.name().to_string(), c.clone());
    c
});

static WRAPPERS: Lazy<[ClassRef; 8]> = Lazy::new(|| {
    PrimKind::ALL.map(|k| {
        let c = ClassRef(Arc::new(ClassData {
            name: k.wrapper_name().to_string(),
            superclass: Some(object_class().clone()),
            kind: ClassKind::Wrapper(k),
        }));
        CLASSES.insert(c.name().to_string(), c.clone());
        c
    })
});

/// The canonical reference marker every reference type erases to.
pub fn object_class() -> &'static ClassRef {
    &OBJECT
}

/// The wrapper class corresponding to a primitive kind.
pub fn wrapper_class(kind: PrimKind) -> &'static ClassRef {
    &WRAPPERS[PrimKind::ALL.iter().position(|k| *k == kind).unwrap()]
}

/// Intern a plain class under `name` with the given superclass (defaulting
/// to `Object`). Repeated requests for the same name return the same handle;
/// the superclass of the first interning wins.
pub fn class_named(name: &str, superclass: Option<&ClassRef>) -> ClassRef {
    Lazy::force(&WRAPPERS);
    if let Some(existing) = CLASSES.get(name) {
        return existing.clone();
    }
    let sup = superclass.unwrap_or_else(|| object_class()).clone();
    CLASSES
        .entry(name.to_string())
        .or_insert_with(|| {
            ClassRef(Arc::new(ClassData {
                name: name.to_string(),
                superclass: Some(sup),
                kind: ClassKind::Plain,
            }))
        })
        .clone()
}

/// Intern the array class over `elem`.
pub fn array_class(elem: &SemanticType) -> ClassRef {
    Lazy::force(&WRAPPERS);
    let name = format!("{elem}[]");
    CLASSES
        .entry(name.clone())
        .or_insert_with(|| {
            ClassRef(Arc::new(ClassData {
                name,
                superclass: Some(object_class().clone()),
                kind: ClassKind::Array(elem.clone()),
            }))
        })
        .clone()
}

/// One position of a call shape: `void`, a primitive kind, or a reference
/// class. `void` is a zero-width pseudo-type; it is legal only as a return
/// type and contributes zero slots.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Void,
    Prim(PrimKind),
    Ref(ClassRef),
}

impl SemanticType {
    /// The canonical erased reference type.
    pub fn object() -> SemanticType {
        SemanticType::Ref(object_class().clone())
    }

    pub fn is_prim(&self) -> bool {
        matches!(self, SemanticType::Prim(_))
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, SemanticType::Ref(_))
    }

    pub fn prim_kind(&self) -> Option<PrimKind> {
        match self {
            SemanticType::Prim(k) => Some(*k),
            _ => None,
        }
    }

    pub fn class(&self) -> Option<&ClassRef> {
        match self {
            SemanticType::Ref(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_wide(&self) -> bool {
        matches!(self, SemanticType::Prim(k) if k.is_wide())
    }

    /// Slot width: zero for `void`, two for wide primitives, one otherwise.
    pub fn slot_width(&self) -> usize {
        match self {
            SemanticType::Void => 0,
            SemanticType::Prim(k) => k.slot_width(),
            SemanticType::Ref(_) => 1,
        }
    }

    /// Erasure: every reference type collapses to the `Object` marker,
    /// primitives and `void` are unchanged.
    pub fn erase(&self) -> SemanticType {
        match self {
            SemanticType::Ref(c) if !c.is_object() => SemanticType::object(),
            other => other.clone(),
        }
    }

    pub fn is_erased(&self) -> bool {
        match self {
            SemanticType::Ref(c) => c.is_object(),
            _ => true,
        }
    }
}

impl Debug for SemanticType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for SemanticType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::Void => f.write_str("void"),
            SemanticType::Prim(k) => f.write_str(k.name()),
            SemanticType::Ref(c) => Display::fmt(c, f),
        }
    }
}
