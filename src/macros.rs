//! Internal helper macros.

/// Declares numeric error code constants together with a `get_error_message`
/// lookup returning the human readable text for a code.
macro_rules! define_error_codes {
    ($($name:ident = $code:literal => $msg:literal),* $(,)?) => {
        $(
            pub const $name: u32 = $code;
        )*

        /// Returns the message registered for an error code, if any.
        pub fn get_error_message(code: u32) -> Option<&'static str> {
            match code {
                $($code => Some($msg),)*
                _ => None,
            }
        }
    };
}
