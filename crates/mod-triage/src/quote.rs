//! Removes quoted history from a reply body.
//!
//! Mail clients append the previous message as `>`-prefixed lines under an
//! attribution header such as `On Mon, Jan 1 at 2:00 PM John wrote:`. Only the
//! text the sender actually authored is kept.

const ATTRIBUTION_PREFIX: &str = "On ";
const ATTRIBUTION_SUFFIX: &str = "wrote:";
const QUOTE_MARKER: char = '>';

/// Strips attribution headers and quoted lines in a single pass.
///
/// The blank line a client inserts right after an attribution header is
/// dropped too; any other blank line is kept. Surviving lines keep their
/// original indentation, and the joined result is trimmed.
pub fn strip_quotes(body: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut skip_next_blank = false;

    for line in body.split('\n') {
        let trimmed = line.trim();

        if is_attribution(trimmed) {
            skip_next_blank = true;
            continue;
        }

        if skip_next_blank && trimmed.is_empty() {
            skip_next_blank = false;
            continue;
        }
        skip_next_blank = false;

        if !trimmed.starts_with(QUOTE_MARKER) {
            kept.push(line);
        }
    }

    kept.join("\n").trim().to_string()
}

pub fn is_attribution(trimmed: &str) -> bool {
    trimmed.starts_with(ATTRIBUTION_PREFIX) && trimmed.ends_with(ATTRIBUTION_SUFFIX)
}
