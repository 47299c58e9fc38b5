//! Names the scope check never reports as undefined.

use phf::phf_set;

/// Built-in functions, constants and common exception/type names.
static BUILTINS: phf::Set<&'static str> = phf_set! {
    "print", "len", "str", "int", "list", "dict", "set", "tuple", "range", "enumerate",
    "zip", "map", "filter", "sum", "max", "min", "abs", "all", "any", "open", "type",
    "isinstance", "issubclass", "super", "property", "staticmethod", "classmethod",
    "True", "False", "None",
    "Exception", "ValueError", "TypeError", "KeyError", "AttributeError",
};

/// Check if a name is on the built-in allow-list.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(name)
}
