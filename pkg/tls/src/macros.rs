/// Defines an enum backed by a single wire byte. Codes not listed map to the
/// Unknown variant so that decoding never fails on an unassigned value.
macro_rules! tls_enum_u8 {
    ($(#[$meta:meta])* $name:ident => { $($variant:ident($value:literal)),* $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        #[allow(non_camel_case_types)]
        pub enum $name {
            $($variant,)*
            Unknown(u8),
        }

        impl $name {
            pub fn from_u8(value: u8) -> Self {
                match value {
                    $($value => $name::$variant,)*
                    other => $name::Unknown(other),
                }
            }

            pub fn to_u8(&self) -> u8 {
                match self {
                    $($name::$variant => $value,)*
                    $name::Unknown(value) => *value,
                }
            }
        }
    };
}
