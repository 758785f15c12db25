//! Completion detection and JSON extraction for model replies.

use crate::constants::END_INTAKE_MARKER;

/// Whether this turn ends the intake.
///
/// A turn is terminal when the inbound message carries [`END_INTAKE_MARKER`], or when the
/// model's reply, once trimmed, is shaped like a JSON object (`{` ... `}`).
pub fn is_terminal(input: &str, output: &str) -> bool {
    if input.contains(END_INTAKE_MARKER) {
        return true;
    }
    let trimmed = output.trim();
    trimmed.starts_with('{') && trimmed.ends_with('}')
}

/// Substring from the first `{` to the last `}` of `output`, inclusive.
///
/// Braces are not balanced: prose containing braces before or after the object, or two
/// separate objects, yields a slice that fails to parse. Such replies surface as
/// validation failures and the user is asked again.
pub fn extract_json(output: &str) -> Option<&str> {
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    (start < end).then(|| &output[start..=end])
}
