//! Cross-component checks: ids, titles and registry hygiene.

use std::collections::BTreeSet;

use tracing::warn;

use super::error::{ValidationFatal, ValidationResult};
use super::DatasetValidator;
use crate::model::{
    codes, ComponentError, ComponentType, ErrorFilter, TopLevelComponentId,
};

impl<'a> DatasetValidator<'a> {
    /// Reject an id that is reserved or already held by any component.
    pub(super) fn validate_new_id(&self, id: &str) -> ValidationResult<()> {
        if TopLevelComponentId::is_reserved(id) {
            return Err(ValidationFatal::ReservedId(id.to_string()));
        }
        if let Some(kind) = self.ds.kind_of_id(id) {
            return Err(ValidationFatal::IdCollision {
                id: id.to_string(),
                kind,
            });
        }
        Ok(())
    }

    /// `(id, title)` pairs of a title namespace, with its conflict code.
    fn title_namespace(&self, kind: ComponentType) -> Option<(codes::Code, Vec<(String, String)>)> {
        let (code, entries) = match kind {
            ComponentType::Field => (
                codes::FIELD_TITLE_CONFLICT,
                self.ds
                    .result_schema
                    .iter()
                    .map(|f| (f.id.clone(), f.title.clone()))
                    .collect(),
            ),
            ComponentType::DataSource => (
                codes::SOURCE_TITLE_CONFLICT,
                self.ds
                    .sources
                    .iter()
                    .map(|s| (s.id.clone(), s.title.clone()))
                    .collect(),
            ),
            ComponentType::SourceAvatar => (
                codes::AVATAR_TITLE_CONFLICT,
                self.ds
                    .avatars
                    .iter()
                    .map(|a| (a.id.clone(), a.title.clone()))
                    .collect(),
            ),
            _ => return None,
        };
        Some((code, entries))
    }

    /// Recompute title conflicts around a title change of `id`.
    ///
    /// Every component sharing the old or the new title is rechecked, so a
    /// conflict is reported on all parties and disappears from those no
    /// longer involved. Running it twice changes nothing.
    pub(super) fn validate_title(
        &mut self,
        kind: ComponentType,
        id: &str,
        old_title: Option<&str>,
        new_title: Option<&str>,
    ) {
        let Some((code, entries)) = self.title_namespace(kind) else {
            return;
        };

        let mut involved: BTreeSet<&str> = BTreeSet::from([id]);
        for title in [old_title, new_title].into_iter().flatten() {
            involved.extend(
                entries
                    .iter()
                    .filter(|(_, t)| t == title)
                    .map(|(other, _)| other.as_str()),
            );
        }

        for component_id in involved {
            let Some((_, title)) = entries.iter().find(|(other, _)| other == component_id) else {
                continue;
            };
            let shared = entries.iter().filter(|(_, t)| t == title).count() > 1;

            self.ds
                .error_registry
                .remove_errors(component_id, ErrorFilter::Code(code));
            if shared {
                self.register_error(
                    kind,
                    component_id,
                    ComponentError::new(
                        code,
                        format!("{} title '{}' is not unique", kind, title),
                    )
                    .with_detail("title", title.clone()),
                );
            }
            self.mark_affected(kind, component_id);
        }
    }

    /// Error packs whose component no longer exists.
    fn orphan_packs(&self) -> Vec<(String, ComponentType)> {
        self.ds
            .error_registry
            .items
            .iter()
            .filter(|pack| !self.ds.component_exists(pack.component_type, &pack.id))
            .map(|pack| (pack.id.clone(), pack.component_type))
            .collect()
    }

    /// Drop error packs whose component no longer exists.
    ///
    /// Returns the number of packs removed.
    pub fn remove_phantom_errors(&mut self) -> usize {
        let phantoms = self.orphan_packs();
        for (id, kind) in &phantoms {
            warn!(component = %kind, id = %id, "removing errors of missing component");
            self.ds.error_registry.remove_pack(id);
        }
        phantoms.len()
    }

    /// End-of-batch check over the registry. Orphans are reported, not
    /// removed; returns how many were found.
    pub(super) fn sweep_orphan_errors(&self) -> usize {
        let orphans = self.orphan_packs();
        for (id, kind) in &orphans {
            warn!(dataset = %self.ds.id, component = %kind, id = %id, "errors left for missing component");
        }
        orphans.len()
    }
}
