use super::{Libraries, LibraryLink, LinkingError, NeededLibrary};
use crate::{address::Address, artifacts::LinkReferences};
use indexmap::IndexMap;
use tracing::debug;

/// Flattens link references into one entry per `(source, library)` pair
pub fn needed_libraries(link_references: &LinkReferences) -> Vec<NeededLibrary> {
    link_references
        .iter()
        .flat_map(|(source_name, libraries)| {
            libraries.keys().map(move |library_name| NeededLibrary {
                source_name: source_name.clone(),
                library_name: library_name.clone(),
            })
        })
        .collect()
}

/// Matches every supplied library against the libraries a contract needs.
///
/// An identifier is either a bare library name, which must be unique across source
/// files, or a fully-qualified `source:Name`. Every supplied identifier must match
/// exactly one needed library, no library may be supplied twice, and every needed
/// library must be supplied. The first violation is returned.
pub fn resolve_libraries(
    contract_name: &str,
    link_references: &LinkReferences,
    libraries: &Libraries,
) -> Result<Vec<LibraryLink>, LinkingError> {
    let needed = needed_libraries(link_references);

    let links = libraries.iter().try_fold(
        IndexMap::<String, LibraryLink>::new(),
        |mut links, (identifier, address)| {
            let link = resolve_one(contract_name, &needed, identifier, address)?;
            let fully_qualified_name = link.fully_qualified_name();
            if links.contains_key(&fully_qualified_name) {
                return Err(LinkingError::DuplicateLibraryLink {
                    contract_name: contract_name.to_string(),
                    library_name: link.library_name,
                    fully_qualified_name,
                });
            }
            debug!("Resolved library {} to {} ({})", identifier, fully_qualified_name, link.address);
            links.insert(fully_qualified_name, link);
            Ok(links)
        },
    )?;

    if links.len() < needed.len() {
        let missing: Vec<String> = needed
            .iter()
            .map(NeededLibrary::fully_qualified_name)
            .filter(|name| !links.contains_key(name))
            .collect();
        return Err(LinkingError::MissingLibraryLinks {
            contract_name: contract_name.to_string(),
            missing,
        });
    }

    Ok(links.into_values().collect())
}

fn resolve_one(
    contract_name: &str,
    needed: &[NeededLibrary],
    identifier: &str,
    address: &str,
) -> Result<LibraryLink, LinkingError> {
    let address: Address = address
        .parse()
        .map_err(|reason| LinkingError::InvalidAddress {
            contract_name: contract_name.to_string(),
            library: identifier.to_string(),
            address: address.to_string(),
            reason,
        })?;

    let matching: Vec<&NeededLibrary> = needed
        .iter()
        .filter(|lib| lib.library_name == identifier || lib.fully_qualified_name() == identifier)
        .collect();

    match matching.as_slice() {
        [] => Err(LinkingError::UnknownLibrary {
            contract_name: contract_name.to_string(),
            library: identifier.to_string(),
            needed: needed.iter().map(NeededLibrary::fully_qualified_name).collect(),
        }),
        [library] => Ok(LibraryLink {
            source_name: library.source_name.clone(),
            library_name: library.library_name.clone(),
            address,
        }),
        candidates => Err(LinkingError::AmbiguousLibraryName {
            contract_name: contract_name.to_string(),
            library: identifier.to_string(),
            candidates: candidates
                .iter()
                .map(|lib| lib.fully_qualified_name())
                .collect(),
        }),
    }
}
