//! Diff planning
//!
//! Compares the local tree against a remote listing and decides, per key,
//! whether to upload, skip or delete:
//! - New or changed files are uploaded
//! - Identical files are skipped
//! - Remote-only objects are deleted when delete-removed is enabled

use crate::config::{CannedAcl, ObjectParams, SyncTarget};
use crate::error::Result;
use crate::fs::FileDescriptor;
use crate::hash::etag_md5;
use crate::storage::{RemoteListing, RemoteObjectMeta};
use crate::sync::ParamResolver;
use std::collections::HashSet;

/// One unit of planned work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// Upload a new or changed file
    Upload {
        /// Local file
        file: FileDescriptor,
        /// Destination key (prefix included)
        key: String,
        /// Effective upload parameters
        params: ObjectParams,
    },
    /// Delete a remote object
    Delete {
        /// Full object key
        key: String,
        /// Remote size, used for progress accounting
        size: u64,
    },
    /// Leave an identical object alone
    Skip {
        /// Path relative to the local directory
        relative_path: String,
    },
}

impl SyncAction {
    /// Object key touched by a transfer action
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Upload { key, .. } | Self::Delete { key, .. } => Some(key),
            Self::Skip { .. } => None,
        }
    }

    /// Whether the action needs a network call
    pub fn is_transfer(&self) -> bool {
        !matches!(self, Self::Skip { .. })
    }

    /// Bytes this action accounts for in progress reporting
    pub fn weight(&self) -> u64 {
        match self {
            Self::Upload { file, .. } => file.size,
            Self::Delete { size, .. } => *size,
            Self::Skip { .. } => 0,
        }
    }
}

/// How an unchanged file was recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchBasis {
    /// Size and content MD5 matched the ETag
    Hash,
    /// Size matched; the remote ETag was not a usable digest
    SizeOnly,
}

/// Ordered list of actions plus bookkeeping
#[derive(Debug, Clone, Default)]
pub struct SyncPlan {
    actions: Vec<SyncAction>,
    /// Skips confirmed by content hash
    pub hash_matches: usize,
    /// Skips decided on size alone
    pub size_only_matches: usize,
}

impl SyncPlan {
    /// Wrap a list of actions
    pub fn from_actions(actions: Vec<SyncAction>) -> Self {
        Self {
            actions,
            ..Default::default()
        }
    }

    /// Actions in plan order
    pub fn actions(&self) -> &[SyncAction] {
        &self.actions
    }

    /// Consume into actions
    pub fn into_actions(self) -> Vec<SyncAction> {
        self.actions
    }

    /// Number of uploads
    pub fn uploads(&self) -> usize {
        self.count(|a| matches!(a, SyncAction::Upload { .. }))
    }

    /// Number of deletes
    pub fn deletes(&self) -> usize {
        self.count(|a| matches!(a, SyncAction::Delete { .. }))
    }

    /// Number of skips
    pub fn skips(&self) -> usize {
        self.count(|a| matches!(a, SyncAction::Skip { .. }))
    }

    /// Bytes that will be uploaded
    pub fn bytes_to_upload(&self) -> u64 {
        self.actions
            .iter()
            .filter_map(|a| match a {
                SyncAction::Upload { file, .. } => Some(file.size),
                _ => None,
            })
            .sum()
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.actions.iter().any(SyncAction::is_transfer)
    }

    fn count(&self, predicate: impl Fn(&SyncAction) -> bool) -> usize {
        self.actions.iter().filter(|a| predicate(a)).count()
    }

    /// Print summary
    pub fn print_summary(&self) {
        println!("=== Sync Plan ===");
        println!(
            "To upload: {} files ({})",
            self.uploads(),
            humansize::format_size(self.bytes_to_upload(), humansize::BINARY)
        );
        println!("To skip:   {} files", self.skips());
        println!("To delete: {} objects", self.deletes());
    }

    /// Print every transfer action
    pub fn print_actions(&self) {
        for action in &self.actions {
            match action {
                SyncAction::Upload { file, key, .. } => {
                    println!("upload  {} -> {}", file.relative_path, key)
                }
                SyncAction::Delete { key, .. } => println!("delete  {}", key),
                SyncAction::Skip { .. } => {}
            }
        }
    }
}

/// Builds a [`SyncPlan`] from local and remote state
pub struct DiffPlanner<'a> {
    key_prefix: String,
    acl: CannedAcl,
    delete_removed: bool,
    resolver: &'a ParamResolver,
}

impl<'a> DiffPlanner<'a> {
    /// Create a planner
    pub fn new(key_prefix: impl Into<String>, delete_removed: bool, resolver: &'a ParamResolver) -> Self {
        Self {
            key_prefix: key_prefix.into(),
            acl: CannedAcl::default(),
            delete_removed,
            resolver,
        }
    }

    /// Create a planner configured from a sync target
    pub fn for_target(target: &SyncTarget, resolver: &'a ParamResolver) -> Self {
        Self::new(target.key_prefix(), target.delete_removed, resolver).with_acl(target.acl)
    }

    /// Base ACL for uploads
    pub fn with_acl(mut self, acl: CannedAcl) -> Self {
        self.acl = acl;
        self
    }

    /// Plan a sync
    ///
    /// `digest` returns the hex MD5 of a local file. It is only called when
    /// sizes match and the remote ETag is a usable digest.
    pub fn plan<D>(
        &self,
        local: &[FileDescriptor],
        remote: &RemoteListing,
        mut digest: D,
    ) -> Result<SyncPlan>
    where
        D: FnMut(&FileDescriptor) -> Result<String>,
    {
        let mut plan = SyncPlan::default();

        for file in local {
            let unchanged = match remote.get(&file.relative_path) {
                Some(existing) => self.compare(file, existing, &mut digest)?,
                None => None,
            };

            match unchanged {
                Some(MatchBasis::Hash) => plan.hash_matches += 1,
                Some(MatchBasis::SizeOnly) => plan.size_only_matches += 1,
                None => {}
            }

            let action = if unchanged.is_some() {
                SyncAction::Skip {
                    relative_path: file.relative_path.clone(),
                }
            } else {
                SyncAction::Upload {
                    file: file.clone(),
                    key: format!("{}{}", self.key_prefix, file.relative_path),
                    params: self.resolver.upload_params(self.acl, &file.relative_path),
                }
            };
            plan.actions.push(action);
        }

        if self.delete_removed {
            let local_paths: HashSet<&str> =
                local.iter().map(|f| f.relative_path.as_str()).collect();

            for object in remote.iter() {
                if !local_paths.contains(object.relative_key.as_str()) {
                    plan.actions.push(SyncAction::Delete {
                        key: object.key.clone(),
                        size: object.size,
                    });
                }
            }
        }

        tracing::debug!(
            "Planned {} upload(s), {} skip(s), {} delete(s)",
            plan.uploads(),
            plan.skips(),
            plan.deletes()
        );

        Ok(plan)
    }

    /// `Some(basis)` when the remote object is identical to the local file
    fn compare<D>(
        &self,
        file: &FileDescriptor,
        remote: &RemoteObjectMeta,
        digest: &mut D,
    ) -> Result<Option<MatchBasis>>
    where
        D: FnMut(&FileDescriptor) -> Result<String>,
    {
        if file.size != remote.size {
            return Ok(None);
        }

        match remote.etag.as_deref().and_then(etag_md5) {
            Some(remote_md5) => {
                let local_md5 = digest(file)?;
                Ok(local_md5
                    .eq_ignore_ascii_case(&remote_md5)
                    .then_some(MatchBasis::Hash))
            }
            None => Ok(Some(MatchBasis::SizeOnly)),
        }
    }
}

/// Plan the removal of every listed object
pub fn plan_clear(remote: RemoteListing) -> SyncPlan {
    SyncPlan::from_actions(
        remote
            .into_objects()
            .into_iter()
            .map(|object| SyncAction::Delete {
                key: object.key,
                size: object.size,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::md5_bytes;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn local(path: &str, size: u64) -> FileDescriptor {
        FileDescriptor {
            relative_path: path.to_string(),
            absolute_path: PathBuf::from("/dist").join(path),
            size,
            modified: SystemTime::UNIX_EPOCH,
            is_symlink: false,
        }
    }

    fn remote(prefix: &str, entries: &[(&str, u64, Option<String>)]) -> RemoteListing {
        RemoteListing::from_objects(
            entries
                .iter()
                .map(|(rel, size, etag)| RemoteObjectMeta {
                    key: format!("{}{}", prefix, rel),
                    relative_key: rel.to_string(),
                    size: *size,
                    etag: etag.clone(),
                })
                .collect(),
        )
    }

    fn quoted_md5(data: &[u8]) -> Option<String> {
        Some(format!("\"{}\"", md5_bytes(data)))
    }

    /// Digest function backed by a path -> content table
    fn digests(contents: &[(&str, &[u8])]) -> impl FnMut(&FileDescriptor) -> Result<String> {
        let table: HashMap<String, String> = contents
            .iter()
            .map(|(path, data)| (path.to_string(), md5_bytes(data)))
            .collect();
        move |file| Ok(table.get(&file.relative_path).cloned().unwrap_or_default())
    }

    #[test]
    fn test_skip_upload_delete_scenario() {
        let resolver = ParamResolver::default();
        let planner = DiffPlanner::new("app/", true, &resolver);

        let files = vec![local("a.txt", 5), local("b.txt", 3)];
        let listing = remote(
            "app/",
            &[("a.txt", 5, quoted_md5(b"hello")), ("c.txt", 9, quoted_md5(b"whatever!"))],
        );

        let plan = planner
            .plan(&files, &listing, digests(&[("a.txt", b"hello"), ("b.txt", b"bee")]))
            .unwrap();

        let summary: Vec<String> = plan
            .actions()
            .iter()
            .map(|a| match a {
                SyncAction::Skip { relative_path } => format!("skip {}", relative_path),
                SyncAction::Upload { file, key, .. } => format!("upload {} {}", file.relative_path, key),
                SyncAction::Delete { key, .. } => format!("delete {}", key),
            })
            .collect();

        assert_eq!(
            summary,
            vec!["skip a.txt", "upload b.txt app/b.txt", "delete app/c.txt"]
        );
        assert_eq!(plan.hash_matches, 1);
        assert_eq!(plan.bytes_to_upload(), 3);
    }

    #[test]
    fn test_same_size_different_content_uploads() {
        let resolver = ParamResolver::default();
        let planner = DiffPlanner::new("", true, &resolver);

        let files = vec![local("a.txt", 5)];
        let listing = remote("", &[("a.txt", 5, quoted_md5(b"hello"))]);

        let plan = planner
            .plan(&files, &listing, digests(&[("a.txt", b"HELLO")]))
            .unwrap();
        assert_eq!(plan.uploads(), 1);
        assert_eq!(plan.hash_matches, 0);
    }

    #[test]
    fn test_size_only_fallback_for_multipart_etag() {
        let resolver = ParamResolver::default();
        let planner = DiffPlanner::new("", true, &resolver);

        let files = vec![local("big.bin", 5)];
        let listing = remote(
            "",
            &[("big.bin", 5, Some("\"0123456789abcdef0123456789abcdef-4\"".into()))],
        );

        let mut digest_calls = 0;
        let plan = planner
            .plan(&files, &listing, |_| {
                digest_calls += 1;
                Ok(String::new())
            })
            .unwrap();

        assert_eq!(plan.skips(), 1);
        assert_eq!(plan.size_only_matches, 1);
        assert_eq!(digest_calls, 0);
    }

    #[test]
    fn test_size_only_fallback_without_etag() {
        let resolver = ParamResolver::default();
        let planner = DiffPlanner::new("", true, &resolver);
        let plan = planner
            .plan(&[local("a", 1)], &remote("", &[("a", 1, None)]), |_| Ok(String::new()))
            .unwrap();
        assert_eq!(plan.size_only_matches, 1);
    }

    #[test]
    fn test_size_mismatch_skips_digest() {
        let resolver = ParamResolver::default();
        let planner = DiffPlanner::new("", true, &resolver);
        let plan = planner
            .plan(
                &[local("a", 2)],
                &remote("", &[("a", 1, quoted_md5(b"a"))]),
                |_| panic!("digest should not be computed"),
            )
            .unwrap();
        assert_eq!(plan.uploads(), 1);
    }

    #[test]
    fn test_no_deletes_without_delete_removed() {
        let resolver = ParamResolver::default();
        let planner = DiffPlanner::new("p/", false, &resolver);
        let plan = planner
            .plan(&[], &remote("p/", &[("x", 1, None), ("y", 2, None)]), |_| Ok(String::new()))
            .unwrap();
        assert!(plan.actions().is_empty());
        assert!(!plan.has_changes());
    }

    #[test]
    fn test_upload_carries_resolved_params() {
        let resolver = ParamResolver::new(&[crate::config::ParamRule::new(
            "*.html",
            ObjectParams {
                cache_control: Some("no-cache".into()),
                ..Default::default()
            },
        )])
        .unwrap();
        let target = SyncTarget::new("dist", "b").with_acl(CannedAcl::PublicRead);
        let planner = DiffPlanner::for_target(&target, &resolver);

        let plan = planner
            .plan(&[local("index.html", 10)], &RemoteListing::default(), |_| Ok(String::new()))
            .unwrap();

        match &plan.actions()[0] {
            SyncAction::Upload { params, .. } => {
                assert_eq!(params.acl, Some(CannedAcl::PublicRead));
                assert_eq!(params.cache_control.as_deref(), Some("no-cache"));
                assert_eq!(params.content_type.as_deref(), Some("text/html"));
            }
            other => panic!("expected upload, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_clear() {
        let plan = plan_clear(remote("app/", &[("a", 1, None), ("b", 2, None), ("c/d", 3, None)]));
        let keys: Vec<_> = plan.actions().iter().filter_map(SyncAction::key).collect();
        assert_eq!(keys, vec!["app/a", "app/b", "app/c/d"]);
        assert_eq!(plan.deletes(), 3);
    }

    proptest! {
        #[test]
        fn prop_plan_invariants(
            local_files in prop::collection::btree_map("[a-e]{1,2}", 0u64..4, 0..10),
            remote_files in prop::collection::btree_map("[a-e]{1,2}", 0u64..4, 0..10),
            delete_removed in any::<bool>(),
        ) {
            let resolver = ParamResolver::default();
            let planner = DiffPlanner::new("pre/", delete_removed, &resolver);

            let files: Vec<_> = local_files.iter().map(|(p, s)| local(p, *s)).collect();
            let entries: Vec<(&str, u64, Option<String>)> =
                remote_files.iter().map(|(p, s)| (p.as_str(), *s, None)).collect();
            let listing = remote("pre/", &entries);

            let plan = planner.plan(&files, &listing, |_| Ok(String::new())).unwrap();

            let mut uploaded = HashSet::new();
            let mut deleted = HashSet::new();
            for action in plan.actions() {
                match action {
                    SyncAction::Upload { key, .. } => { uploaded.insert(key.clone()); }
                    SyncAction::Delete { key, .. } => { deleted.insert(key.clone()); }
                    SyncAction::Skip { .. } => {}
                }
            }

            prop_assert!(uploaded.is_disjoint(&deleted));
            prop_assert_eq!(plan.uploads() + plan.skips(), files.len());
            if !delete_removed {
                prop_assert_eq!(plan.deletes(), 0);
            } else {
                let expected = remote_files.keys().filter(|k| !local_files.contains_key(*k)).count();
                prop_assert_eq!(plan.deletes(), expected);
            }
        }
    }
}
