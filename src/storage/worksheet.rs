//! A filesystem backed store of allocation records.
//!
//! The [`Worksheet`] manages one directory of `HW-<id>.yaml` records. It is
//! a wrapper around the filesystem-agnostic [`AllocationTree`]: records are
//! loaded in parallel, assembled into the tree with full link validation,
//! and written back with [`flush`](Worksheet::flush).

use std::{
    ffi::OsStr,
    fmt::Write as _,
    io,
    path::{Path, PathBuf},
};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use thiserror::Error;
use tracing::instrument;
use walkdir::WalkDir;

use crate::{
    domain::{
        AllocationConfig, AllocationEngine, AllocationNode, AllocationTree, HardwareId, TreeError,
    },
    storage::{
        path_parser::{parse_id_from_path, record_path},
        record::NodeRecord,
    },
};

/// Name of the metadata directory inside the worksheet root.
const META_DIR: &str = ".ralloc";

/// Errors loading or saving a worksheet.
#[derive(Debug, Error)]
pub enum WorksheetError {
    /// A record file could not be read or written.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A record file is not valid YAML for the record schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// The offending file.
        path: PathBuf,
        /// The underlying YAML error.
        source: serde_yaml::Error,
    },

    /// YAML files were found whose names are not hardware record names.
    #[error("{}", display_unrecognised(.0))]
    UnrecognisedFiles(Vec<PathBuf>),

    /// The records do not assemble into a valid tree (duplicate ids,
    /// missing parents, cycles).
    #[error(transparent)]
    Tree(#[from] TreeError),
}

fn display_unrecognised(paths: &[PathBuf]) -> String {
    let mut message = String::from("Unrecognised files: ");
    for (i, path) in paths.iter().enumerate() {
        if i > 0 {
            message.push_str(", ");
        }
        let _ = write!(message, "{}", path.display());
    }
    message
}

/// A directory of allocation records plus the configuration that governs
/// them.
#[derive(Debug)]
pub struct Worksheet {
    /// The worksheet root directory.
    root: PathBuf,
    config: AllocationConfig,
    tree: AllocationTree,
}

impl Worksheet {
    /// Opens the worksheet rooted at the given directory, loading every
    /// record into the tree.
    ///
    /// A missing root is treated as an empty worksheet; it is created on
    /// the first [`flush`](Worksheet::flush).
    ///
    /// # Errors
    ///
    /// Returns an error when a YAML file has a name that is not a record
    /// name, a record fails to parse, or the records do not form a tree
    /// (duplicate ids, unknown parents, cycles).
    #[instrument]
    pub fn open(root: PathBuf) -> Result<Self, WorksheetError> {
        let config = load_config(&root);
        let paths = collect_record_paths(&root);

        let mut records: Vec<(PathBuf, HardwareId)> = Vec::with_capacity(paths.len());
        let mut unrecognised = Vec::new();
        for path in paths {
            match parse_id_from_path(&path) {
                Ok(id) => records.push((path, id)),
                Err(_) => unrecognised.push(path),
            }
        }
        if !unrecognised.is_empty() {
            unrecognised.sort();
            return Err(WorksheetError::UnrecognisedFiles(unrecognised));
        }

        let loaded: Vec<Result<AllocationNode, WorksheetError>> = records
            .par_iter()
            .map(|(path, id)| load_record(path, *id))
            .collect();

        let mut nodes = Vec::with_capacity(loaded.len());
        for result in loaded {
            nodes.push(result?);
        }

        let links: Vec<(HardwareId, HardwareId)> = nodes
            .iter()
            .filter_map(|node| node.parent_id.map(|parent| (node.id, parent)))
            .collect();

        let mut tree = AllocationTree::with_capacity(nodes.len());
        for node in nodes {
            tree.insert(node)?;
        }
        for (child, parent) in links {
            tree.link(child, parent)?;
        }

        Ok(Self { root, config, tree })
    }

    /// The worksheet's configuration.
    #[must_use]
    pub const fn config(&self) -> &AllocationConfig {
        &self.config
    }

    /// The in-memory tree of records.
    #[must_use]
    pub const fn tree(&self) -> &AllocationTree {
        &self.tree
    }

    /// Mutable access to the tree of records.
    pub const fn tree_mut(&mut self) -> &mut AllocationTree {
        &mut self.tree
    }

    /// An allocation engine over this worksheet's tree and configuration.
    pub const fn engine(&mut self) -> AllocationEngine<'_> {
        AllocationEngine::new(&mut self.tree, &self.config)
    }

    /// Adds a record, wiring it under its `parent_id` when one is set.
    ///
    /// # Errors
    ///
    /// Returns a [`TreeError`] when the id already exists, the parent is
    /// missing, or the node is offered as its own parent. On error the tree
    /// is unchanged.
    pub fn add_node(&mut self, node: AllocationNode) -> Result<(), WorksheetError> {
        let id = node.id;
        let parent = node.parent_id;

        if let Some(parent) = parent {
            if !self.tree.contains(parent) {
                return Err(TreeError::ParentNotFound(parent).into());
            }
        }

        self.tree.insert(node)?;
        if let Some(parent) = parent {
            if let Err(err) = self.tree.link(id, parent) {
                self.tree.remove(id);
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Removes a record and deletes its file. The removed node's children
    /// become roots. Returns `true` if the record existed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the record file exists but cannot be
    /// deleted.
    pub fn remove_node(&mut self, id: HardwareId) -> Result<bool, WorksheetError> {
        if !self.tree.remove(id) {
            return Ok(false);
        }

        match std::fs::remove_file(record_path(&self.root, id)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(err) => Err(err.into()),
        }
    }

    /// Writes every record back to disk, creating the root directory if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or a record
    /// cannot be serialized or written.
    #[instrument(skip(self))]
    pub fn flush(&self) -> Result<(), WorksheetError> {
        std::fs::create_dir_all(&self.root)?;

        for node in self.tree.iter() {
            let path = record_path(&self.root, node.id);
            let content = serde_yaml::to_string(&NodeRecord::from(node))
                .map_err(|source| WorksheetError::Parse {
                    path: path.clone(),
                    source,
                })?;
            std::fs::write(&path, content)?;
        }
        Ok(())
    }

    /// The path of this worksheet's configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        config_path(&self.root)
    }
}

/// The configuration file location for a worksheet root.
#[must_use]
pub fn config_path(root: &Path) -> PathBuf {
    root.join(META_DIR).join("config.toml")
}

fn load_config(root: &Path) -> AllocationConfig {
    let path = config_path(root);
    AllocationConfig::load(&path).unwrap_or_else(|e| {
        tracing::debug!("Failed to load config: {e}");
        AllocationConfig::default()
    })
}

fn collect_record_paths(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| {
            // Skip the metadata directory.
            !entry.path().components().any(|c| c.as_os_str() == META_DIR)
        })
        .filter(|entry| {
            matches!(
                entry.path().extension().and_then(OsStr::to_str),
                Some("yaml" | "yml")
            )
        })
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn load_record(path: &Path, id: HardwareId) -> Result<AllocationNode, WorksheetError> {
    let content = std::fs::read_to_string(path)?;
    let record: NodeRecord =
        serde_yaml::from_str(&content).map_err(|source| WorksheetError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(record.into_node(id))
}
