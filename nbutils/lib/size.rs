//! Human readable byte sizes.

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const SUFFIXES: [&str; 6] = ["B", "K", "M", "G", "T", "P"];

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Formats a byte count using 1024-based units.
///
/// The amount is the integer part of the size in the largest unit that keeps it at or above one,
/// followed by a single letter suffix. Sizes beyond the petabyte range stay in petabytes.
///
/// ## Examples
///
/// ```
/// use nbutils::format_size;
///
/// assert_eq!(format_size(512), "512B");
/// assert_eq!(format_size(1536), "1K");
/// assert_eq!(format_size(5 * 1024 * 1024 * 1024), "5G");
/// ```
pub fn format_size(bytes: u64) -> String {
    let mut amount = bytes;
    let mut unit = 0;
    while amount >= 1024 && unit < SUFFIXES.len() - 1 {
        amount /= 1024;
        unit += 1;
    }

    format!("{amount}{}", SUFFIXES[unit])
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
