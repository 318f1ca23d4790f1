//! What the dataset's current sources allow.
//!
//! A dataset reads through a single connection, and every join it performs
//! must be executable by every connector involved. These rules decide whether
//! a new source may be added and which join types relations may use.

use std::collections::BTreeSet;

use crate::connectors::SourceProbe;
use crate::model::{Dataset, JoinType};

/// Capability queries over a dataset, with connector knowledge from a probe.
pub struct DatasetCapabilities<'a> {
    ds: &'a Dataset,
    probe: &'a dyn SourceProbe,
}

impl<'a> DatasetCapabilities<'a> {
    pub fn new(ds: &'a Dataset, probe: &'a dyn SourceProbe) -> Self {
        Self { ds, probe }
    }

    /// Connection of the first remaining source, if any.
    pub fn effective_connection_id(&self, ignore: &BTreeSet<String>) -> Option<&'a str> {
        let source_id = self.ds.single_data_source_id(ignore)?;
        self.ds.source(source_id)?.conn_id()
    }

    /// Join types every remaining source supports.
    pub fn supported_join_types(&self, ignore: &BTreeSet<String>) -> BTreeSet<JoinType> {
        let all: BTreeSet<JoinType> = [
            JoinType::Inner,
            JoinType::Left,
            JoinType::Right,
            JoinType::Full,
        ]
        .into();

        self.ds
            .sources
            .iter()
            .filter(|source| !ignore.contains(&source.id))
            .fold(all, |acc, source| {
                let supported = self.probe.supported_join_types(source.source_type());
                acc.intersection(&supported).copied().collect()
            })
    }

    /// Whether a source of `source_type` on `conn_id` can join the dataset.
    ///
    /// An empty dataset accepts anything. Otherwise the new source must share
    /// at least one join type with the existing ones and use the same
    /// connection.
    pub fn source_can_be_added(
        &self,
        conn_id: Option<&str>,
        source_type: &str,
        ignore: &BTreeSet<String>,
    ) -> bool {
        if self.ds.single_data_source_id(ignore).is_none() {
            return true;
        }

        let existing = self.supported_join_types(ignore);
        let candidate = self.probe.supported_join_types(source_type);
        if existing.is_disjoint(&candidate) {
            return false;
        }

        conn_id == self.effective_connection_id(ignore)
    }

    /// Whether both avatars' connectors can execute `join_type`.
    pub fn relation_join_supported(
        &self,
        left_avatar_id: &str,
        right_avatar_id: &str,
        join_type: JoinType,
    ) -> bool {
        [left_avatar_id, right_avatar_id].iter().all(|avatar_id| {
            self.ds
                .avatar(avatar_id)
                .and_then(|avatar| self.ds.source(&avatar.source_id))
                .map_or(true, |source| {
                    self.probe
                        .supported_join_types(source.source_type())
                        .contains(&join_type)
                })
        })
    }
}
