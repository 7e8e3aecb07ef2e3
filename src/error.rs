use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Only a small part of the API is fallible. Registration of module level tables, the
/// structural verifier and the input validation of the generic cloner report problems through
/// this type. Expected negative outcomes such as "this call cannot be devirtualized" are plain
/// `Option` values, and programmer errors (erasing an instruction whose results are still used,
/// cloning a global initializer) are assertions.
///
/// # Error Categories
///
/// ## Structural Errors
/// - [`Error::Malformed`] - The IR violates a structural invariant
/// - [`Error::Verification`] - The verifier rejected a function
///
/// ## Module Errors
/// - [`Error::DuplicateFunction`] - A function with the same name already exists
/// - [`Error::UnknownFunction`] - No function with the requested name exists
/// - [`Error::DuplicateTable`] - A second vtable or witness table was registered for the same key
///
/// ## Transformation Errors
/// - [`Error::InvalidReabstraction`] - Re-abstraction flags do not fit a function signature
///
/// # Examples
///
/// ```rust,ignore
/// use silcore::{Error, ir::verify_function};
///
/// match verify_function(&module, func) {
///     Ok(()) => println!("function is well formed"),
///     Err(Error::Verification { function, message }) => {
///         eprintln!("{function}: {message}");
///     }
///     Err(e) => eprintln!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The IR is structurally malformed.
    ///
    /// Carries the place where the problem was detected, which makes it easy to find the
    /// check that fired.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The verifier rejected a function.
    #[error("Verification failed in {function}: {message}")]
    Verification {
        /// Name of the offending function
        function: String,
        /// Description of the violated invariant
        message: String,
    },

    /// A function with this name is already defined in the module.
    #[error("Duplicate function - {0}")]
    DuplicateFunction(String),

    /// The module contains no function with this name.
    #[error("Unknown function - {0}")]
    UnknownFunction(String),

    /// A vtable or witness table was registered twice for the same class or conformance.
    #[error("Duplicate table - {0}")]
    DuplicateTable(String),

    /// The requested re-abstraction cannot be applied to the function signature.
    #[error("Invalid reabstraction - {0}")]
    InvalidReabstraction(String),
}
