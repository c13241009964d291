//! Result type alias

use super::errors::DeidError;

/// Result type alias for fallible operations
///
/// # Examples
///
/// ```
/// use dicom_deid::domain::result::Result;
/// use dicom_deid::domain::errors::DeidError;
///
/// fn failing_function() -> Result<()> {
///     Err(DeidError::Configuration("missing input directory".to_string()))
/// }
/// assert!(failing_function().is_err());
/// ```
pub type Result<T> = std::result::Result<T, DeidError>;
