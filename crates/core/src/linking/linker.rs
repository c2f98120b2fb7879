use super::{LibraryLink, LinkingError};
use crate::{address::ADDRESS_LENGTH, artifacts::LinkReferences};

const HEX_PREFIX: &str = "0x";

/// Writes each library address into its placeholder spans.
///
/// Byte offset `start` maps to character offset `2 + start * 2` of the hex string.
/// The input is left untouched and the result always has the input's length.
pub fn link_bytecode(
    bytecode: &str,
    link_references: &LinkReferences,
    links: &[LibraryLink],
) -> Result<String, LinkingError> {
    if !bytecode.starts_with(HEX_PREFIX) {
        return Err(LinkingError::fault("bytecode is missing the 0x prefix"));
    }

    let mut linked = bytecode.as_bytes().to_vec();

    for link in links {
        let spans = link_references
            .get(&link.source_name)
            .and_then(|libraries| libraries.get(&link.library_name))
            .ok_or_else(|| {
                LinkingError::fault(format!(
                    "no link references for {}",
                    link.fully_qualified_name()
                ))
            })?;

        let digits = link.address.checksum_digits();
        for span in spans {
            if span.length != ADDRESS_LENGTH {
                return Err(LinkingError::fault(format!(
                    "{} has a {}-byte placeholder at offset {}, addresses are {} bytes",
                    link.fully_qualified_name(),
                    span.length,
                    span.start,
                    ADDRESS_LENGTH
                )));
            }

            let out_of_range = || {
                LinkingError::fault(format!(
                    "placeholder of {} at offset {} exceeds the {}-byte bytecode",
                    link.fully_qualified_name(),
                    span.start,
                    (bytecode.len() - HEX_PREFIX.len()) / 2
                ))
            };

            // start comes straight from artifact JSON
            let begin = span
                .start
                .checked_mul(2)
                .and_then(|offset| offset.checked_add(HEX_PREFIX.len()))
                .ok_or_else(out_of_range)?;
            let end = begin
                .checked_add(ADDRESS_LENGTH * 2)
                .ok_or_else(out_of_range)?;
            let target = linked.get_mut(begin..end).ok_or_else(out_of_range)?;
            target.copy_from_slice(digits.as_bytes());
        }
    }

    String::from_utf8(linked)
        .map_err(|_| LinkingError::fault("linking split a non-ASCII character"))
}
