//! Candidate indexer
//!
//! Walks one or more search roots lazily and builds a queryable index of the
//! audio files found there. The index lives for one scan and is rebuilt, never
//! diffed.
//!
//! **Lookups:** normalized title key, containing directory name, extension,
//! filename token. [`CandidateIndex::candidates_for`] combines them for a
//! track:
//! 1. Exact title key of the track name
//! 2. Title key of the name without bracketed/feat./version annotations
//! 3. Files containing every name token, in any order
//! 4. Only when 1-3 found nothing: partial token matches, favouring files
//!    under a directory named after the artist, capped at [`PARTIAL_MATCH_CAP`]
//!
//! Unreadable subtrees are skipped and recorded as [`IndexWarning`]s.

use crate::error::{IndexWarning, ScanError};
use crate::models::audio_file::{extension_of, is_supported_extension};
use crate::models::{AudioFileRef, TrackDescriptor};
use crate::utils::text::{contains_phrase, normalize, strip_annotations, title_key, tokens};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Upper bound on files returned by the partial-match fallback
pub const PARTIAL_MATCH_CAP: usize = 100;

/// Default maximum directory depth below a root
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Name tokens shorter than this are ignored by the partial fallback
const MIN_PARTIAL_TOKEN_LEN: usize = 3;

type EntryIter = Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send>;

/// Audio file discovery over search roots
pub struct CandidateIndexer {
    ignore_patterns: Vec<String>,
    max_depth: usize,
}

impl CandidateIndexer {
    /// Create an indexer with default ignore patterns
    ///
    /// Ignores system files like .DS_Store, AppleDouble `._` files, .git, etc.
    pub fn new() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
                ".Trash".to_string(),
                "._".to_string(),
            ],
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Lazily enumerate supported audio files under `roots`
    pub fn walk(&self, roots: &[PathBuf]) -> IndexWalk {
        IndexWalk {
            pending: roots.iter().cloned().collect(),
            current: None,
            ignore_patterns: self.ignore_patterns.clone(),
            max_depth: self.max_depth,
            warnings: Vec::new(),
        }
    }

    /// Walk `roots` completely and index the result
    pub fn index(&self, roots: &[PathBuf]) -> CandidateIndex {
        let index = CandidateIndex::from_walk(self.walk(roots));
        tracing::info!(
            roots = roots.len(),
            files = index.len(),
            warnings = index.warnings().len(),
            "Candidate index built"
        );
        index
    }
}

impl Default for CandidateIndexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy traversal yielding one [`AudioFileRef`] per supported file
///
/// Roots are visited in the given order, entries sorted by file name so the
/// discovery order is stable across runs.
pub struct IndexWalk {
    pending: VecDeque<PathBuf>,
    current: Option<(PathBuf, EntryIter)>,
    ignore_patterns: Vec<String>,
    max_depth: usize,
    warnings: Vec<IndexWarning>,
}

impl IndexWalk {
    pub fn warnings(&self) -> &[IndexWarning] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<IndexWarning> {
        self.warnings
    }

    fn open_root(&mut self, root: PathBuf) {
        if !root.is_dir() {
            self.record(IndexWarning::RootNotFound(root));
            return;
        }
        let ignore = self.ignore_patterns.clone();
        let entries = WalkDir::new(&root)
            .follow_links(true)
            .max_depth(self.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !is_ignored(entry, &ignore));
        self.current = Some((root, Box::new(entries)));
    }

    fn record(&mut self, warning: IndexWarning) {
        let error = ScanError::from(warning.clone());
        tracing::warn!(path = %warning.path().display(), error = %error, "Skipping subtree");
        self.warnings.push(warning);
    }

    fn entry_to_file(&mut self, entry: DirEntry) -> Option<AudioFileRef> {
        if !entry.file_type().is_file() || !is_supported_extension(&extension_of(entry.path())) {
            return None;
        }
        match entry.metadata() {
            Ok(metadata) => Some(AudioFileRef::from_metadata(entry.path(), &metadata)),
            Err(e) => {
                self.record(IndexWarning::Unreadable {
                    path: entry.path().to_path_buf(),
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}

impl Iterator for IndexWalk {
    type Item = AudioFileRef;

    fn next(&mut self) -> Option<AudioFileRef> {
        loop {
            let Some((root, entries)) = self.current.as_mut() else {
                let root = self.pending.pop_front()?;
                self.open_root(root);
                continue;
            };

            match entries.next() {
                None => self.current = None,
                Some(Ok(entry)) => {
                    if let Some(file) = self.entry_to_file(entry) {
                        return Some(file);
                    }
                }
                Some(Err(error)) => {
                    let path = error
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| root.clone());
                    let warning = if error.loop_ancestor().is_some() {
                        IndexWarning::SymlinkLoop(path)
                    } else {
                        IndexWarning::Unreadable {
                            path,
                            reason: error.to_string(),
                        }
                    };
                    self.record(warning);
                }
            }
        }
    }
}

fn is_ignored(entry: &DirEntry, patterns: &[String]) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    patterns.iter().any(|p| {
        if p == "._" {
            name.starts_with(p.as_str())
        } else {
            name.contains(p.as_str())
        }
    })
}

// ============================================================================
// Index
// ============================================================================

/// In-memory index over the files of one scan
#[derive(Debug, Default)]
pub struct CandidateIndex {
    files: Vec<AudioFileRef>,
    by_title: HashMap<String, Vec<usize>>,
    by_token: HashMap<String, Vec<usize>>,
    by_dir: HashMap<String, Vec<usize>>,
    by_ext: HashMap<String, Vec<usize>>,
    warnings: Vec<IndexWarning>,
}

impl CandidateIndex {
    /// Drain a walk into an index, keeping its warnings
    pub fn from_walk(mut walk: IndexWalk) -> Self {
        let mut index = Self::default();
        for file in walk.by_ref() {
            index.insert(file);
        }
        index.warnings = walk.into_warnings();
        index
    }

    pub fn from_files(files: impl IntoIterator<Item = AudioFileRef>) -> Self {
        let mut index = Self::default();
        for file in files {
            index.insert(file);
        }
        index
    }

    fn insert(&mut self, file: AudioFileRef) {
        let id = self.files.len();
        let stem = file.stem();

        let mut titles = BTreeSet::new();
        titles.insert(title_key(&stem));
        titles.insert(title_key(&strip_annotations(&stem)));
        for title in titles.into_iter().filter(|t| !t.is_empty()) {
            self.by_title.entry(title).or_default().push(id);
        }

        let stem_tokens: BTreeSet<String> = tokens(&stem).into_iter().collect();
        for token in stem_tokens {
            self.by_token.entry(token).or_default().push(id);
        }

        if let Some(dir) = file.path.parent().and_then(|p| p.file_name()) {
            let dir = normalize(&dir.to_string_lossy());
            if !dir.is_empty() {
                self.by_dir.entry(dir).or_default().push(id);
            }
        }

        self.by_ext.entry(file.extension.clone()).or_default().push(id);
        self.files.push(file);
    }

    /// All files in discovery order
    pub fn files(&self) -> &[AudioFileRef] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn warnings(&self) -> &[IndexWarning] {
        &self.warnings
    }

    fn collect(&self, ids: Option<&Vec<usize>>) -> Vec<&AudioFileRef> {
        ids.map(|ids| ids.iter().map(|&id| &self.files[id]).collect())
            .unwrap_or_default()
    }

    /// Files whose title key equals the normalized `name`
    pub fn by_name(&self, name: &str) -> Vec<&AudioFileRef> {
        self.collect(self.by_title.get(&title_key(name)))
    }

    /// Files whose immediate parent directory is named `dir`
    pub fn in_directory(&self, dir: &str) -> Vec<&AudioFileRef> {
        self.collect(self.by_dir.get(&normalize(dir)))
    }

    /// Files with extension `ext` (case-insensitive, no dot)
    pub fn with_extension(&self, ext: &str) -> Vec<&AudioFileRef> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        if !is_supported_extension(&ext) {
            return Vec::new();
        }
        self.collect(self.by_ext.get(&ext))
    }

    /// Ids of files containing every token
    fn containing_all(&self, name_tokens: &[String]) -> BTreeSet<usize> {
        let mut postings = name_tokens.iter().map(|t| self.by_token.get(t));
        let Some(Some(first)) = postings.next() else {
            return BTreeSet::new();
        };
        let mut ids: BTreeSet<usize> = first.iter().copied().collect();
        for posting in postings {
            let Some(posting) = posting else {
                return BTreeSet::new();
            };
            let other: BTreeSet<usize> = posting.iter().copied().collect();
            ids = ids.intersection(&other).copied().collect();
        }
        ids
    }

    /// Partial token matches ranked by overlap, artist directories first
    fn partial_matches(&self, name_tokens: &[String], artist: &str) -> BTreeSet<usize> {
        let mut overlap: HashMap<usize, usize> = HashMap::new();
        for token in name_tokens.iter().filter(|t| t.chars().count() >= MIN_PARTIAL_TOKEN_LEN) {
            for &id in self.by_token.get(token).into_iter().flatten() {
                *overlap.entry(id).or_default() += 1;
            }
        }

        let mut ranked: Vec<(usize, bool, usize)> = overlap
            .into_iter()
            .map(|(id, count)| {
                let under_artist = !artist.is_empty() && path_mentions(&self.files[id].path, artist);
                (id, under_artist, count)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)));
        ranked.into_iter().take(PARTIAL_MATCH_CAP).map(|(id, _, _)| id).collect()
    }

    /// Retrieve plausible replacement files for a track, in discovery order
    pub fn candidates_for(&self, track: &TrackDescriptor) -> Vec<&AudioFileRef> {
        let mut ids: BTreeSet<usize> = BTreeSet::new();

        if let Some(exact) = self.by_title.get(&title_key(&track.name)) {
            ids.extend(exact.iter().copied());
        }
        let stripped = strip_annotations(&track.name);
        if let Some(base) = self.by_title.get(&title_key(&stripped)) {
            ids.extend(base.iter().copied());
        }

        let name_tokens = tokens(&stripped);
        if !name_tokens.is_empty() {
            ids.extend(self.containing_all(&name_tokens));
        }

        if ids.is_empty() {
            let artist = normalize(&track.artist);
            ids = self.partial_matches(&name_tokens, &artist);
            tracing::debug!(
                track = %track,
                partial = ids.len(),
                "No direct candidates, using partial matches"
            );
        }

        ids.into_iter().map(|id| &self.files[id]).collect()
    }
}

/// Whether any directory component of `path` contains the normalized `phrase`
fn path_mentions(path: &Path, phrase: &str) -> bool {
    path.parent()
        .into_iter()
        .flat_map(|p| p.components())
        .any(|c| contains_phrase(&normalize(&c.as_os_str().to_string_lossy()), phrase))
}
