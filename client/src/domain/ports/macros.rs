//! Helper macro generating port error enums.
//!
//! Each generated enum derives `thiserror::Error`, gets one snake_case
//! constructor per variant (string fields accept `impl Into<String>`), and a
//! `variant_name` accessor used as a structured logging field.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            #[doc = concat!("Construct [`Self::", stringify!($variant), "`].")]
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            #[doc = concat!("Construct [`Self::", stringify!($variant), "`].")]
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };

    (@pattern $variant:ident) => { Self::$variant };
    (@pattern $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => { Self::$variant { .. } };

    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $(
                    #[allow(missing_docs, reason = "described by the variant message")]
                    $field : $ty
                ),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*

            /// Variant name for structured logs.
            pub const fn variant_name(&self) -> &'static str {
                match self {
                    $(
                        define_port_error!(@pattern $variant $( { $($field : $ty),* } )?) =>
                            stringify!($variant),
                    )*
                }
            }
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    define_port_error! {
        pub enum ExamplePortError {
            Offline => "backend offline",
            Rejected { message: String } => "rejected: {message}",
            Throttled { message: String, retry_after: u32 } => "throttled: {message} ({retry_after}s)",
        }
    }

    #[test]
    fn unit_variants_get_constructors() {
        assert_eq!(ExamplePortError::offline().to_string(), "backend offline");
    }

    #[test]
    fn constructors_accept_str_for_string_fields() {
        let err = ExamplePortError::rejected("bad token");
        assert_eq!(err.to_string(), "rejected: bad token");
    }

    #[test]
    fn constructors_support_mixed_fields() {
        let err = ExamplePortError::throttled("slow down", 30_u32);
        assert_eq!(err.to_string(), "throttled: slow down (30s)");
    }

    #[test]
    fn variant_names_match_declarations() {
        assert_eq!(ExamplePortError::offline().variant_name(), "Offline");
        assert_eq!(
            ExamplePortError::throttled("x", 1_u32).variant_name(),
            "Throttled"
        );
    }
}
