use super::ByteSize;
use crate::prelude::*;
use std::collections::BTreeMap;

/// The size of a pointer in bytes.
///
/// The analysis does not model a target architecture,
/// it only needs a consistent byte model to fold `sizeof` expressions with.
pub const POINTER_SIZE: ByteSize = ByteSize::new(8);

/// The size of an `int` in bytes.
pub const INT_SIZE: ByteSize = ByteSize::new(4);

/// A C type as far as the analysis needs to distinguish types:
/// scalars, pointers, structs, fixed arrays and function pointers.
///
/// `const` qualifiers are dropped during parsing,
/// signedness is not tracked (all integers are treated as signed).
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub enum CType {
    /// The `void` type. Only valid behind a pointer or as a return type.
    Void,
    /// An integer scalar of the given byte size.
    Int { size: ByteSize },
    /// The `char` type.
    Char,
    /// A pointer to the given type.
    Pointer(Box<CType>),
    /// A struct type referenced by name.
    /// The layout (if known) is stored in the [`TypeRegistry`].
    Struct(String),
    /// A pointer to a function with the given parameter and return types.
    FnPtr {
        /// The parameter types of the pointed-to function.
        params: Vec<CType>,
        /// The return type of the pointed-to function.
        return_type: Box<CType>,
    },
    /// A fixed-size array.
    Array {
        /// The element type.
        element: Box<CType>,
        /// The number of elements.
        length: u64,
    },
}

impl CType {
    /// Returns true if the type is a function pointer
    /// (directly or through a typedef already resolved at registration time).
    pub fn is_fn_ptr(&self) -> bool {
        matches!(self, CType::FnPtr { .. })
    }

    /// Returns true if the type is any kind of pointer.
    pub fn is_pointer(&self) -> bool {
        matches!(self, CType::Pointer(_) | CType::FnPtr { .. })
    }

    /// If the type is an array, return its element type.
    pub fn element_type(&self) -> Option<&CType> {
        match self {
            CType::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// If the type is a pointer, return the pointed-to type.
    pub fn strip_pointer(&self) -> Option<&CType> {
        match self {
            CType::Pointer(inner) => Some(inner),
            _ => None,
        }
    }
}

/// A field of a struct layout.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone)]
pub struct StructField {
    /// The declared field name.
    pub name: String,
    /// The declared field type.
    pub ty: CType,
}

/// The layout of a struct definition, i.e. its fields in declaration order.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct StructLayout {
    /// The fields of the struct in declaration order.
    pub fields: Vec<StructField>,
}

impl StructLayout {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// All type information collected from a translation unit:
/// typedefs and struct layouts.
///
/// Struct types mentioned but never defined (e.g. types from skipped headers
/// like `struct stat`) stay unregistered and get an opaque default size.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
pub struct TypeRegistry {
    typedefs: BTreeMap<String, CType>,
    structs: BTreeMap<String, StructLayout>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> TypeRegistry {
        TypeRegistry::default()
    }

    /// Register a typedef. The target type must already be fully resolved,
    /// i.e. it may not refer to another typedef by name.
    pub fn register_typedef(&mut self, name: impl ToString, ty: CType) {
        self.typedefs.insert(name.to_string(), ty);
    }

    /// Register (or overwrite with a complete definition) a struct layout.
    pub fn register_struct(&mut self, name: impl ToString, layout: StructLayout) {
        self.structs.insert(name.to_string(), layout);
    }

    /// Look up a typedef by name.
    pub fn typedef(&self, name: &str) -> Option<&CType> {
        self.typedefs.get(name)
    }

    /// Look up a struct layout by name. Returns `None` for structs
    /// that were only forward-declared or come from skipped headers.
    pub fn struct_layout(&self, name: &str) -> Option<&StructLayout> {
        self.structs.get(name)
    }

    /// Look up the type of a field of the given struct.
    pub fn field_type(&self, struct_name: &str, field: &str) -> Option<&CType> {
        self.struct_layout(struct_name)?
            .field(field)
            .map(|field| &field.ty)
    }

    /// Compute the size of a type in bytes.
    ///
    /// Structs are laid out without padding, which keeps `sizeof` ratios
    /// (array length computations) exact. Unknown struct types get the
    /// opaque default size of one pointer.
    pub fn size_of(&self, ty: &CType) -> ByteSize {
        match ty {
            CType::Void => ByteSize::new(1),
            CType::Char => ByteSize::new(1),
            CType::Int { size } => *size,
            CType::Pointer(_) | CType::FnPtr { .. } => POINTER_SIZE,
            CType::Array { element, length } => self.size_of(element) * ByteSize::new(*length),
            CType::Struct(name) => match self.struct_layout(name) {
                Some(layout) => layout
                    .fields
                    .iter()
                    .map(|field| self.size_of(&field.ty))
                    .sum(),
                None => POINTER_SIZE,
            },
        }
    }

    /// Iterate over all registered struct layouts.
    pub fn structs(&self) -> impl Iterator<Item = (&String, &StructLayout)> {
        self.structs.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor_layout() -> StructLayout {
        StructLayout {
            fields: vec![
                StructField {
                    name: "data".into(),
                    ty: CType::Pointer(Box::new(CType::Void)),
                },
                StructField {
                    name: "name".into(),
                    ty: CType::Pointer(Box::new(CType::Char)),
                },
                StructField {
                    name: "read_data".into(),
                    ty: CType::FnPtr {
                        params: vec![CType::Pointer(Box::new(CType::Struct("reader".into())))],
                        return_type: Box::new(CType::Int { size: INT_SIZE }),
                    },
                },
            ],
        }
    }

    #[test]
    fn struct_sizes_and_array_ratios() {
        let mut registry = TypeRegistry::new();
        registry.register_struct("descriptor", descriptor_layout());
        let descriptor = CType::Struct("descriptor".into());
        assert_eq!(registry.size_of(&descriptor), ByteSize::new(24));

        let table = CType::Array {
            element: Box::new(descriptor.clone()),
            length: 9,
        };
        let table_size = u64::from(registry.size_of(&table));
        let element_size = u64::from(registry.size_of(&descriptor));
        assert_eq!(table_size / element_size, 9);
    }

    #[test]
    fn unknown_structs_get_opaque_sizes() {
        let registry = TypeRegistry::new();
        assert_eq!(
            registry.size_of(&CType::Struct("stat".into())),
            POINTER_SIZE
        );
        assert!(registry.field_type("stat", "st_size").is_none());
    }

    #[test]
    fn fn_ptr_fields_are_recognized() {
        let mut registry = TypeRegistry::new();
        registry.register_struct("descriptor", descriptor_layout());
        assert!(registry
            .field_type("descriptor", "read_data")
            .unwrap()
            .is_fn_ptr());
        assert!(!registry.field_type("descriptor", "data").unwrap().is_fn_ptr());
    }
}
