pub mod file_detection;
#[doc(hidden)]
pub mod test_helpers;

pub use file_detection::{BinaryClassifier, FileClass};
