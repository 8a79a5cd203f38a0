//! Directory/file hierarchy for a single download.
//!
//! The tree is built once from the engine's flat file listing. Directories
//! own their children in insertion order and never store a priority or a
//! progress value of their own: both are derived from the leaves on every
//! read, so a directory can never disagree with the files below it.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{TreeError, TreeResult};
use crate::model::{
    AffectedLeaf, FileEntry, PATH_SEPARATOR, Priority, PriorityState, join_segments,
};

/// Absorbs representation error so that e.g. `0.29` reports 29 rather than 28.
const PERCENT_TOLERANCE: f64 = 1e-9;

/// A single downloadable file. Always a leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    path: Vec<String>,
    index: u32,
    size_bytes: u64,
    priority: Priority,
    completion: f64,
}

impl FileNode {
    fn new(path: Vec<String>, index: u32, size_bytes: u64) -> Self {
        Self {
            path,
            index,
            size_bytes,
            priority: Priority::default(),
            completion: 0.0,
        }
    }

    /// Path segments from the download root.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Full `/`-separated path.
    #[must_use]
    pub fn full_path(&self) -> String {
        join_segments(&self.path)
    }

    /// Final path segment.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.last().map_or("", String::as_str)
    }

    /// Index of the file in the engine's file listing.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Size of the file in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Current download priority.
    #[must_use]
    pub const fn priority(&self) -> Priority {
        self.priority
    }

    /// Completion fraction in `[0, 1]` last reported by the engine.
    #[must_use]
    pub const fn completion(&self) -> f64 {
        self.completion
    }
}

/// A directory synthesised from the shared prefixes of file paths.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DirectoryNode {
    path: Vec<String>,
    children: Vec<Node>,
    positions: HashMap<String, usize>,
}

impl DirectoryNode {
    fn new(path: Vec<String>) -> Self {
        Self {
            path,
            children: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Path segments from the download root; empty for the root itself.
    #[must_use]
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Full `/`-separated path; empty for the root.
    #[must_use]
    pub fn full_path(&self) -> String {
        join_segments(&self.path)
    }

    /// Final path segment; empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        self.path.last().map_or("", String::as_str)
    }

    /// Children in insertion order.
    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// Child with the given segment name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.positions
            .get(name)
            .and_then(|position| self.children.get(*position))
    }

    /// Descendant files in depth-first pre-order.
    #[must_use]
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves {
            stack: self.children.iter().rev().collect(),
        }
    }

    /// Sum of all descendant file sizes.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        self.leaves().map(FileNode::size_bytes).sum()
    }

    /// `Uniform` when every descendant file shares a priority, `Mixed` otherwise.
    ///
    /// A directory without files reports the default priority.
    #[must_use]
    pub fn derive_priority(&self) -> PriorityState {
        let mut leaves = self.leaves();
        let Some(first) = leaves.next().map(FileNode::priority) else {
            return PriorityState::Uniform(Priority::default());
        };
        if leaves.all(|leaf| leaf.priority() == first) {
            PriorityState::Uniform(first)
        } else {
            PriorityState::Mixed
        }
    }

    /// Size-weighted completion of all descendant files.
    ///
    /// Skipped files still count towards the total size. An empty or
    /// zero-byte directory reports `0.0`.
    #[must_use]
    pub fn derive_progress(&self) -> f64 {
        let (completed, total) = self
            .leaves()
            .fold((0.0_f64, 0_u64), |(completed, total), leaf| {
                (
                    leaf.completion().mul_add(to_f64(leaf.size_bytes()), completed),
                    total + leaf.size_bytes(),
                )
            });
        if total == 0 {
            0.0
        } else {
            completed / to_f64(total)
        }
    }

    fn push_child(&mut self, name: String, node: Node) -> usize {
        let position = self.children.len();
        self.children.push(node);
        self.positions.insert(name, position);
        position
    }

    fn insert(&mut self, file: FileNode, depth: usize) -> TreeResult<()> {
        let name = file.path[depth].clone();
        if depth + 1 == file.path.len() {
            self.push_child(name, Node::File(file));
            return Ok(());
        }

        let position = match self.positions.get(&name) {
            Some(position) => *position,
            None => {
                let directory = Self::new(file.path[..=depth].to_vec());
                self.push_child(name, Node::Directory(directory))
            }
        };
        match &mut self.children[position] {
            Node::Directory(directory) => directory.insert(file, depth + 1),
            Node::File(existing) => Err(TreeError::TreeCorrupted {
                path: existing.full_path(),
                reason: "file occupies a directory position",
            }),
        }
    }

    fn child_mut(&mut self, name: &str) -> Option<&mut Node> {
        let position = *self.positions.get(name)?;
        self.children.get_mut(position)
    }

    fn verify(&self) -> TreeResult<()> {
        let corrupted = |reason| TreeError::TreeCorrupted {
            path: self.full_path(),
            reason,
        };
        if !self.path.is_empty() && self.children.is_empty() {
            return Err(corrupted("directory without children"));
        }
        if self.positions.len() != self.children.len() {
            return Err(corrupted("child index out of sync"));
        }
        for (position, child) in self.children.iter().enumerate() {
            let child_path = child.path();
            let Some((name, parent)) = child_path.split_last() else {
                return Err(corrupted("child without a path"));
            };
            if parent != self.path.as_slice() {
                return Err(corrupted("child path does not extend its parent"));
            }
            if self.positions.get(name) != Some(&position) {
                return Err(corrupted("child index out of sync"));
            }
            if let Node::Directory(directory) = child {
                directory.verify()?;
            }
        }
        Ok(())
    }
}

/// A node in the download hierarchy.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Leaf file.
    File(FileNode),
    /// Composite directory.
    Directory(DirectoryNode),
}

impl Node {
    /// Path segments from the download root.
    #[must_use]
    pub fn path(&self) -> &[String] {
        match self {
            Self::File(file) => file.path(),
            Self::Directory(directory) => directory.path(),
        }
    }

    /// Full `/`-separated path.
    #[must_use]
    pub fn full_path(&self) -> String {
        join_segments(self.path())
    }

    /// Final path segment; empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::File(file) => file.name(),
            Self::Directory(directory) => directory.name(),
        }
    }

    /// Whether the node is a file.
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::File(_))
    }

    /// The file behind this node, if it is one.
    #[must_use]
    pub const fn as_file(&self) -> Option<&FileNode> {
        match self {
            Self::File(file) => Some(file),
            Self::Directory(_) => None,
        }
    }

    /// The directory behind this node, if it is one.
    #[must_use]
    pub const fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            Self::Directory(directory) => Some(directory),
            Self::File(_) => None,
        }
    }

    /// Own size for files, sum of descendant sizes for directories.
    #[must_use]
    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::File(file) => file.size_bytes(),
            Self::Directory(directory) => directory.size_bytes(),
        }
    }

    /// Priority of a file, or the derived priority of a directory.
    #[must_use]
    pub fn derive_priority(&self) -> PriorityState {
        match self {
            Self::File(file) => PriorityState::Uniform(file.priority()),
            Self::Directory(directory) => directory.derive_priority(),
        }
    }

    /// Completion of a file, or the size-weighted completion of a directory.
    #[must_use]
    pub fn derive_progress(&self) -> f64 {
        match self {
            Self::File(file) => file.completion(),
            Self::Directory(directory) => directory.derive_progress(),
        }
    }

    /// Completion as a whole percentage, rounded down.
    #[must_use]
    pub fn percent_complete(&self) -> u8 {
        let percent = self
            .derive_progress()
            .mul_add(100.0, PERCENT_TOLERANCE)
            .floor()
            .clamp(0.0, 100.0);
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "value is clamped to 0..=100 before the cast"
        )]
        {
            percent as u8
        }
    }

    fn verify(&self) -> TreeResult<()> {
        match self {
            Self::File(file) if file.path.is_empty() => Err(TreeError::TreeCorrupted {
                path: String::new(),
                reason: "file without a path",
            }),
            Self::File(_) => Ok(()),
            Self::Directory(directory) => directory.verify(),
        }
    }

    fn apply_priority(&mut self, priority: Priority, affected: &mut Vec<AffectedLeaf>) {
        match self {
            Self::File(file) => {
                affected.push(AffectedLeaf {
                    path: file.full_path(),
                    index: file.index,
                    previous: file.priority,
                });
                file.priority = priority;
            }
            Self::Directory(directory) => {
                for child in &mut directory.children {
                    child.apply_priority(priority, affected);
                }
            }
        }
    }
}

/// Depth-first pre-order iterator over the files below a directory.
#[derive(Debug, Clone)]
pub struct Leaves<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Leaves<'a> {
    type Item = &'a FileNode;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node {
                Node::File(file) => return Some(file),
                Node::Directory(directory) => self.stack.extend(directory.children.iter().rev()),
            }
        }
        None
    }
}

/// Priority and progress hierarchy for one download.
#[derive(Debug, Clone, PartialEq)]
pub struct PriorityTree {
    download_id: Uuid,
    root: Node,
}

impl PriorityTree {
    /// Build the hierarchy from the engine's ordered file listing.
    ///
    /// File indices follow the order of `entries`. Directories are created
    /// the first time a file needs them and shared by later files.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidPath`] if any entry is empty, contains an
    /// empty, `.` or `..` segment, repeats an earlier path, or collides with a
    /// directory implied by another entry. Nothing is built in that case.
    pub fn build<I>(download_id: Uuid, entries: I) -> TreeResult<Self>
    where
        I: IntoIterator<Item = FileEntry>,
    {
        let files = validate_entries(entries)?;
        let count = files.len();

        let mut root = DirectoryNode::default();
        for file in files {
            root.insert(file, 0)?;
        }

        debug!(%download_id, files = count, "built priority tree");
        Ok(Self {
            download_id,
            root: Node::Directory(root),
        })
    }

    /// Replace the whole hierarchy with one built from a new file listing.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`PriorityTree::build`]; the current tree is
    /// left untouched when the new listing is rejected.
    pub fn rebuild<I>(&mut self, entries: I) -> TreeResult<()>
    where
        I: IntoIterator<Item = FileEntry>,
    {
        let rebuilt = Self::build(self.download_id, entries)?;
        self.root = rebuilt.root;
        info!(download_id = %self.download_id, files = self.leaf_count(), "rebuilt priority tree");
        Ok(())
    }

    /// Identifier of the download this tree describes.
    #[must_use]
    pub const fn download_id(&self) -> Uuid {
        self.download_id
    }

    /// Root of the hierarchy.
    #[must_use]
    pub const fn root(&self) -> &Node {
        &self.root
    }

    /// Every file in depth-first pre-order.
    #[must_use]
    pub fn leaves(&self) -> Leaves<'_> {
        Leaves {
            stack: vec![&self.root],
        }
    }

    /// Number of files in the download.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.leaves().count()
    }

    /// Sum of all file sizes.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.root.size_bytes()
    }

    /// Resolve a `/`-separated path; the empty path names the root.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] if no node lives at `path`.
    pub fn lookup(&self, path: &str) -> TreeResult<&Node> {
        let mut node = &self.root;
        for segment in lookup_segments(path) {
            node = match node {
                Node::Directory(directory) => directory.child(segment),
                Node::File(_) => None,
            }
            .ok_or_else(|| not_found(path))?;
        }
        Ok(node)
    }

    fn lookup_mut(&mut self, path: &str) -> TreeResult<&mut Node> {
        let mut node = &mut self.root;
        for segment in lookup_segments(path) {
            node = match node {
                Node::Directory(directory) => directory.child_mut(segment),
                Node::File(_) => None,
            }
            .ok_or_else(|| not_found(path))?;
        }
        Ok(node)
    }

    /// Set `priority` on the node at `path` and on every file below it.
    ///
    /// Returns the affected files in depth-first pre-order together with
    /// the priority each held before the change.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] for an unknown path and
    /// [`TreeError::TreeCorrupted`] if the subtree fails its structural
    /// checks; no file is modified in either case.
    pub fn set_priority(
        &mut self,
        path: &str,
        priority: Priority,
    ) -> TreeResult<Vec<AffectedLeaf>> {
        let node = self.lookup_mut(path)?;
        node.verify()?;

        let mut affected = Vec::new();
        node.apply_priority(priority, &mut affected);
        debug!(
            download_id = %self.download_id,
            path,
            %priority,
            leaves = affected.len(),
            "applied priority"
        );
        Ok(affected)
    }

    /// Put each listed file back to its `previous` priority.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] if a listed path is unknown and
    /// [`TreeError::TreeCorrupted`] if it no longer names the same file.
    /// Every path is checked before any file is modified.
    pub fn restore_priorities(&mut self, leaves: &[AffectedLeaf]) -> TreeResult<()> {
        for leaf in leaves {
            match self.lookup(&leaf.path)? {
                Node::File(file) if file.index == leaf.index => {}
                _ => {
                    return Err(TreeError::TreeCorrupted {
                        path: leaf.path.clone(),
                        reason: "restored leaf does not match the recorded file",
                    });
                }
            }
        }
        for leaf in leaves {
            if let Node::File(file) = self.lookup_mut(&leaf.path)? {
                file.priority = leaf.previous;
            }
        }
        Ok(())
    }

    /// Apply completion fractions keyed by full file path.
    ///
    /// Files missing from `fractions` keep their current completion. Keys
    /// that are unknown or name a directory are skipped. Returns the number
    /// of files updated.
    pub fn refresh_progress(&mut self, fractions: &HashMap<String, f64>) -> usize {
        let download_id = self.download_id;
        let mut updated = 0;
        let mut skipped = 0;
        for (path, fraction) in fractions {
            match self.lookup_mut(path) {
                Ok(Node::File(file)) => {
                    file.completion = clamp_fraction(*fraction);
                    updated += 1;
                }
                Ok(Node::Directory(_)) | Err(_) => {
                    debug!(%download_id, path, "ignoring progress for non-file path");
                    skipped += 1;
                }
            }
        }
        debug!(%download_id, updated, skipped, "refreshed progress");
        updated
    }

    /// Derived priority of the node at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] if no node lives at `path`.
    pub fn derive_priority(&self, path: &str) -> TreeResult<PriorityState> {
        Ok(self.lookup(path)?.derive_priority())
    }

    /// Derived completion fraction of the node at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::NotFound`] if no node lives at `path`.
    pub fn derive_progress(&self, path: &str) -> TreeResult<f64> {
        Ok(self.lookup(path)?.derive_progress())
    }
}

fn validate_entries<I>(entries: I) -> TreeResult<Vec<FileNode>>
where
    I: IntoIterator<Item = FileEntry>,
{
    let mut files = Vec::new();
    let mut file_paths = HashSet::new();
    let mut directory_paths = HashSet::new();
    let mut total_size = 0_u64;

    for (position, entry) in entries.into_iter().enumerate() {
        let invalid = |reason| TreeError::InvalidPath {
            path: entry.path.clone(),
            reason,
        };
        let segments = parse_segments(&entry.path).map_err(invalid)?;
        let index = u32::try_from(position).map_err(|_| invalid("file index out of range"))?;

        let joined = join_segments(&segments);
        if file_paths.contains(&joined) {
            return Err(invalid("duplicate path"));
        }
        if directory_paths.contains(&joined) {
            return Err(invalid("file collides with a directory"));
        }
        for depth in 1..segments.len() {
            let prefix = join_segments(&segments[..depth]);
            if file_paths.contains(&prefix) {
                return Err(invalid("directory collides with a file"));
            }
            directory_paths.insert(prefix);
        }
        total_size = total_size
            .checked_add(entry.size_bytes)
            .ok_or_else(|| invalid("total size overflows"))?;
        file_paths.insert(joined);
        files.push(FileNode::new(segments, index, entry.size_bytes));
    }
    Ok(files)
}

fn parse_segments(path: &str) -> Result<Vec<String>, &'static str> {
    if path.is_empty() {
        return Err("empty path");
    }
    path.split(PATH_SEPARATOR)
        .map(|segment| match segment {
            "" => Err("empty path segment"),
            "." | ".." => Err("relative path segment"),
            _ => Ok(segment.to_string()),
        })
        .collect()
}

fn lookup_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR).filter(move |_| !path.is_empty())
}

fn not_found(path: &str) -> TreeError {
    TreeError::NotFound {
        path: path.to_string(),
    }
}

fn clamp_fraction(fraction: f64) -> f64 {
    if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    }
}

const fn to_f64(value: u64) -> f64 {
    #[expect(
        clippy::cast_precision_loss,
        reason = "byte counts are weighted as floating point for progress reporting"
    )]
    {
        value as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(entries: &[(&str, u64)]) -> PriorityTree {
        PriorityTree::build(
            Uuid::nil(),
            entries
                .iter()
                .map(|(path, size)| FileEntry::new(*path, *size)),
        )
        .expect("file list should build")
    }

    fn progress(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(path, fraction)| ((*path).to_string(), *fraction))
            .collect()
    }

    #[test]
    fn build_synthesises_shared_directories() {
        let tree = tree(&[("a/1.txt", 100), ("a/2.txt", 100), ("b.txt", 50)]);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.total_size(), 250);

        let root = tree.root().as_directory().expect("root is a directory");
        let names: Vec<_> = root.children().iter().map(Node::name).collect();
        assert_eq!(names, ["a", "b.txt"]);

        let dir = tree.lookup("a").unwrap().as_directory().unwrap();
        let names: Vec<_> = dir.children().iter().map(Node::name).collect();
        assert_eq!(names, ["1.txt", "2.txt"]);
        assert_eq!(dir.size_bytes(), 200);
        assert!(tree.lookup("b.txt").unwrap().is_leaf());
    }

    #[test]
    fn build_assigns_indices_in_input_order() {
        let tree = tree(&[("x/z.bin", 1), ("y.bin", 2), ("x/a.bin", 3)]);
        let indices: Vec<_> = tree
            .leaves()
            .map(|leaf| (leaf.full_path(), leaf.index()))
            .collect();
        assert_eq!(
            indices,
            [
                ("x/z.bin".to_string(), 0),
                ("x/a.bin".to_string(), 2),
                ("y.bin".to_string(), 1),
            ]
        );
    }

    #[test]
    fn build_rejects_malformed_entries() {
        let cases = [
            (vec![("", 1)], "empty path"),
            (vec![("a//b", 1)], "empty path segment"),
            (vec![("/a", 1)], "empty path segment"),
            (vec![("a/../b", 1)], "relative path segment"),
            (vec![("a/b", 1), ("a/b", 2)], "duplicate path"),
            (vec![("a", 1), ("a/b", 2)], "directory collides with a file"),
            (vec![("a/b", 1), ("a", 2)], "file collides with a directory"),
            (vec![("a", u64::MAX), ("b", 1)], "total size overflows"),
        ];
        for (entries, expected) in cases {
            let result = PriorityTree::build(
                Uuid::nil(),
                entries.into_iter().map(|(p, s)| FileEntry::new(p, s)),
            );
            match result {
                Err(TreeError::InvalidPath { reason, .. }) => assert_eq!(reason, expected),
                other => panic!("expected InvalidPath({expected}), got {other:?}"),
            }
        }
    }

    #[test]
    fn rebuild_is_all_or_nothing() {
        let mut tree = tree(&[("a/1.txt", 10)]);
        tree.set_priority("a/1.txt", Priority::High).unwrap();
        let before = tree.clone();

        let err = tree
            .rebuild([FileEntry::new("ok.txt", 1), FileEntry::new("", 1)])
            .unwrap_err();
        assert!(matches!(err, TreeError::InvalidPath { .. }));
        assert_eq!(tree, before);

        tree.rebuild([FileEntry::new("ok.txt", 1)]).unwrap();
        assert_eq!(tree.leaf_count(), 1);
        assert!(matches!(tree.lookup("a"), Err(TreeError::NotFound { .. })));
    }

    #[test]
    fn lookup_resolves_root_and_misses() {
        let tree = tree(&[("a/1.txt", 10)]);
        assert!(tree.lookup("").unwrap().as_directory().is_some());
        assert!(matches!(
            tree.lookup("a/1.txt/deeper"),
            Err(TreeError::NotFound { path }) if path == "a/1.txt/deeper"
        ));
        assert!(matches!(tree.lookup("a/"), Err(TreeError::NotFound { .. })));
    }

    #[test]
    fn set_priority_on_file_affects_only_that_file() {
        let mut tree = tree(&[("a/1.txt", 10), ("a/2.txt", 10)]);
        let affected = tree.set_priority("a/2.txt", Priority::Low).unwrap();
        assert_eq!(
            affected,
            [AffectedLeaf {
                path: "a/2.txt".into(),
                index: 1,
                previous: Priority::Normal,
            }]
        );
        assert_eq!(tree.derive_priority("a").unwrap(), PriorityState::Mixed);
    }

    #[test]
    fn set_priority_on_directory_reaches_every_descendant() {
        let mut tree = tree(&[("a/b/1", 1), ("a/2", 1), ("a/b/c/3", 1), ("z", 1)]);
        let affected = tree.set_priority("a", Priority::Highest).unwrap();
        let paths: Vec<_> = affected.iter().map(|leaf| leaf.path.as_str()).collect();
        assert_eq!(paths, ["a/b/1", "a/b/c/3", "a/2"]);

        for leaf in tree.lookup("a").unwrap().as_directory().unwrap().leaves() {
            assert_eq!(leaf.priority(), Priority::Highest);
        }
        assert_eq!(
            tree.derive_priority("a").unwrap(),
            PriorityState::Uniform(Priority::Highest)
        );
        assert_eq!(
            tree.lookup("z").unwrap().derive_priority(),
            PriorityState::Uniform(Priority::Normal)
        );

        let again = tree.set_priority("a", Priority::Low).unwrap();
        let repeated: Vec<_> = again.iter().map(|leaf| leaf.path.as_str()).collect();
        assert_eq!(repeated, paths);
        assert!(again.iter().all(|leaf| leaf.previous == Priority::Highest));
    }

    #[test]
    fn set_priority_rejects_corrupted_subtree_without_mutation() {
        let mut tree = tree(&[("a/1.txt", 1), ("a/2.txt", 1)]);
        if let Node::Directory(root) = &mut tree.root {
            if let Some(Node::Directory(dir)) = root.child_mut("a") {
                dir.positions.remove("2.txt");
            }
        }

        let err = tree.set_priority("a", Priority::Low).unwrap_err();
        assert!(matches!(err, TreeError::TreeCorrupted { path, .. } if path == "a"));
        assert!(tree.leaves().all(|leaf| leaf.priority() == Priority::Normal));
    }

    #[test]
    fn restore_priorities_reverts_recorded_leaves() {
        let mut tree = tree(&[("a/1.txt", 1), ("a/2.txt", 1)]);
        let affected = tree.set_priority("a", Priority::DoNotDownload).unwrap();
        tree.restore_priorities(&affected[1..]).unwrap();
        assert_eq!(
            tree.lookup("a/2.txt").unwrap().derive_priority(),
            PriorityState::Uniform(Priority::Normal)
        );
        assert_eq!(tree.derive_priority("a").unwrap(), PriorityState::Mixed);

        let bogus = AffectedLeaf {
            path: "a".into(),
            index: 0,
            previous: Priority::Low,
        };
        assert!(matches!(
            tree.restore_priorities(&[affected[0].clone(), bogus]),
            Err(TreeError::TreeCorrupted { .. })
        ));
        assert_eq!(
            tree.lookup("a/1.txt").unwrap().derive_priority(),
            PriorityState::Uniform(Priority::DoNotDownload)
        );
    }

    #[test]
    fn progress_is_size_weighted() {
        let mut tree = tree(&[("d/half", 100), ("d/full", 300)]);
        let updated = tree.refresh_progress(&progress(&[("d/half", 0.5), ("d/full", 1.0)]));
        assert_eq!(updated, 2);
        let value = tree.derive_progress("d").unwrap();
        assert!((value - 0.875).abs() < f64::EPSILON);
        assert_eq!(tree.lookup("d").unwrap().percent_complete(), 87);
    }

    #[test]
    fn percent_complete_is_not_lost_to_rounding() {
        let mut tree = tree(&[("d/a", 100)]);
        let cases = [(0.29, 29), (0.57, 57), (0.58, 58), (0.289, 28), (1.0, 100)];
        for (fraction, expected) in cases {
            tree.refresh_progress(&progress(&[("d/a", fraction)]));
            assert_eq!(tree.lookup("d").unwrap().percent_complete(), expected);
            assert_eq!(tree.lookup("d/a").unwrap().percent_complete(), expected);
        }
    }

    #[test]
    fn largest_representable_total_still_builds() {
        let tree = tree(&[("a", u64::MAX - 1), ("b", 1)]);
        assert_eq!(tree.total_size(), u64::MAX);
    }

    #[test]
    fn progress_recurses_through_nested_directories() {
        let mut tree = tree(&[("top/inner/a", 100), ("top/b", 100)]);
        tree.refresh_progress(&progress(&[("top/inner/a", 1.0)]));
        let value = tree.derive_progress("top").unwrap();
        assert!((value - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_sized_directory_reports_zero_progress() {
        let mut tree = tree(&[("empty/a", 0), ("empty/b", 0)]);
        tree.refresh_progress(&progress(&[("empty/a", 1.0)]));
        let value = tree.derive_progress("empty").unwrap();
        assert!(value.abs() < f64::EPSILON);
        assert!(!value.is_nan());

        let blank = PriorityTree::build(Uuid::nil(), Vec::new()).unwrap();
        assert!(blank.derive_progress("").unwrap().abs() < f64::EPSILON);
        assert_eq!(
            blank.derive_priority("").unwrap(),
            PriorityState::Uniform(Priority::Normal)
        );
    }

    #[test]
    fn skipped_files_stay_in_the_denominator() {
        let mut tree = tree(&[("d/keep", 100), ("d/skip", 100)]);
        tree.set_priority("d/skip", Priority::DoNotDownload).unwrap();
        tree.refresh_progress(&progress(&[("d/keep", 1.0)]));
        let value = tree.derive_progress("d").unwrap();
        assert!((value - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_refresh_leaves_other_files_untouched() {
        let mut tree = tree(&[("a", 10), ("b", 10), ("c", 10)]);
        tree.refresh_progress(&progress(&[("a", 0.2), ("b", 0.4), ("c", 0.6)]));
        let updated = tree.refresh_progress(&progress(&[("b", 0.9), ("missing", 1.0)]));
        assert_eq!(updated, 1);

        let completions: Vec<_> = tree.leaves().map(FileNode::completion).collect();
        assert_eq!(completions, [0.2, 0.9, 0.6]);
    }

    #[test]
    fn refresh_clamps_out_of_range_fractions() {
        let mut tree = tree(&[("d/a", 1), ("d/b", 1), ("d/c", 1)]);
        tree.refresh_progress(&progress(&[
            ("d/a", 1.5),
            ("d/b", -0.5),
            ("d/c", f64::NAN),
            ("d", 1.0),
        ]));
        let completions: Vec<_> = tree.leaves().map(FileNode::completion).collect();
        assert_eq!(completions, [1.0, 0.0, 0.0]);
    }
}
