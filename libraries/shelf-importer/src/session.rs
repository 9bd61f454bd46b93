//! Import sessions

use shelf_core::{Catalog, MetadataSource, TagCodec};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::choice::{AutoChoices, ChoiceSource};
use crate::events::{ImportObserver, Observers};
use crate::import_log::ImportLog;
use crate::pipeline::{run_sequential, run_threaded, Committer, Discovery, PipelineContext, TaskFactory};
use crate::progress::{HistoryEntity, StateStore};
use crate::ranker::CandidateRanker;
use crate::scanner::{is_audio_file, AlbumGrouper};
use crate::task::{archive_members, is_archive};
use crate::types::{ImportConfig, ImportSummary};
use crate::Result;

/// Imports top-level paths into a catalog
///
/// Decisions come from a [`ChoiceSource`]; by default an [`AutoChoices`]
/// built from the configured fallback and duplicate action.
pub struct ImportSession {
    ctx: PipelineContext,
    choices: Box<dyn ChoiceSource>,
    state: StateStore,
    log: ImportLog,
}

impl ImportSession {
    /// Create a session, loading the state file and opening the import log
    pub fn new(
        config: ImportConfig,
        catalog: Arc<dyn Catalog>,
        codec: Arc<dyn TagCodec>,
        source: Arc<dyn MetadataSource>,
    ) -> Result<Self> {
        config.validate()?;

        let grouper = AlbumGrouper::new()
            .follow_links(config.follow_links)
            .ignore_patterns(&config.ignore);
        let ranker = CandidateRanker::new(config.weights.clone(), config.thresholds.clone());
        let state = match &config.state_file {
            Some(path) => StateStore::load(path),
            None => StateStore::in_memory(),
        };
        let log = match &config.log_path {
            Some(path) => ImportLog::open(path)?,
            None => ImportLog::disabled(),
        };
        let choices = Box::new(AutoChoices::new(
            config.quiet_fallback,
            config.duplicate_action,
        ));

        Ok(Self {
            ctx: PipelineContext {
                config: Arc::new(config),
                catalog,
                codec,
                source,
                ranker: Arc::new(ranker),
                grouper,
                observers: Observers::default(),
            },
            choices,
            state,
            log,
        })
    }

    /// Use `choices` for task and duplicate decisions
    pub fn with_choices(mut self, choices: Box<dyn ChoiceSource>) -> Self {
        self.choices = choices;
        self
    }

    /// Register an observer; an error from it aborts the import
    pub fn with_observer(mut self, observer: Arc<dyn ImportObserver>) -> Self {
        self.ctx.observers.push(observer);
        self
    }

    pub fn config(&self) -> &ImportConfig {
        &self.ctx.config
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Import every path in order
    ///
    /// # Errors
    /// Stops at the first failed commit or observer abort. Work committed
    /// before that stays in the catalog and is recorded as progress.
    pub async fn run(&mut self, paths: &[PathBuf]) -> Result<ImportSummary> {
        let mut summary = ImportSummary::default();

        if self.ctx.config.pretend {
            for toppath in paths {
                self.pretend(toppath, &mut summary);
            }
            return Ok(summary);
        }

        let history = if self.ctx.config.incremental {
            Some(Arc::new(self.valid_history().await?))
        } else {
            None
        };

        for toppath in paths {
            self.import_path(toppath, history.clone(), &mut summary)
                .await?;
        }

        info!("{}", summary.summary_text());
        Ok(summary)
    }

    async fn import_path(
        &mut self,
        toppath: &Path,
        history: Option<Arc<HashSet<String>>>,
        summary: &mut ImportSummary,
    ) -> Result<()> {
        if !self.ctx.config.resume {
            self.state.progress_reset(toppath);
        } else if self.state.is_resuming(toppath) {
            info!(path = %toppath.display(), "Resuming interrupted import");
        }

        let mut factory = self
            .factory(toppath)
            .with_done(self.state.progress_done(toppath));
        if let Some(history) = history {
            factory = factory.with_history(history);
        }

        info!(path = %toppath.display(), "Importing");
        let Self {
            ctx,
            choices,
            state,
            log,
        } = self;
        let ctx = &*ctx;
        let mut committer = Committer::new(ctx, state, log, summary);
        if ctx.config.threaded {
            run_threaded(factory, ctx, choices.as_mut(), &mut committer).await?;
        } else {
            run_sequential(factory, ctx, choices.as_mut(), &mut committer).await?;
        }

        // Finished paths start over next time
        self.state.progress_reset(toppath);
        self.state.save()
    }

    fn factory(&self, toppath: &Path) -> TaskFactory {
        TaskFactory::new(
            toppath.to_path_buf(),
            self.ctx.grouper.clone(),
            Arc::clone(&self.ctx.codec),
            self.ctx.config.singletons,
        )
    }

    /// Report what an import would do without touching anything
    fn pretend(&self, toppath: &Path, summary: &mut ImportSummary) {
        if is_archive(toppath) {
            self.pretend_archive(toppath, summary);
            return;
        }

        for discovery in self.factory(toppath) {
            match discovery {
                Discovery::Empty(path) => summary
                    .messages
                    .push(format!("No files imported from {}", path.display())),
                Discovery::Task(task) if task.is_album() => {
                    let roots: Vec<String> =
                        task.paths().iter().map(|p| p.display().to_string()).collect();
                    summary.messages.push(format!("Album: {}", roots.join("; ")));
                    summary.messages.extend(
                        task.items
                            .iter()
                            .map(|item| format!("  {}", item.path.display())),
                    );
                }
                Discovery::Task(task) => summary.messages.extend(
                    task.items
                        .iter()
                        .map(|item| format!("Singleton: {}", item.path.display())),
                ),
            }
        }
    }

    /// Report an archive's audio members, grouped by their directory inside it
    fn pretend_archive(&self, archive: &Path, summary: &mut ImportSummary) {
        let members = match archive_members(archive) {
            Ok(members) => members,
            Err(e) => {
                warn!(archive = %archive.display(), "Cannot list archive: {}", e);
                summary
                    .messages
                    .push(format!("No files imported from {}", archive.display()));
                return;
            }
        };

        let grouper = &self.ctx.grouper;
        let files: Vec<PathBuf> = members
            .into_iter()
            .filter(|member| is_audio_file(member))
            .filter(|member| {
                !member
                    .iter()
                    .any(|name| grouper.is_ignored(&name.to_string_lossy()))
            })
            .collect();

        if files.is_empty() {
            summary
                .messages
                .push(format!("No files imported from {}", archive.display()));
            return;
        }

        if self.ctx.config.singletons {
            summary.messages.extend(
                files
                    .iter()
                    .map(|file| format!("Singleton: {}", archive.join(file).display())),
            );
            return;
        }

        let mut current: Option<&Path> = None;
        for file in &files {
            let dir = file.parent().unwrap_or(Path::new(""));
            if current != Some(dir) {
                let root = if dir.as_os_str().is_empty() {
                    archive.to_path_buf()
                } else {
                    archive.join(dir)
                };
                summary.messages.push(format!("Album: {}", root.display()));
                current = Some(dir);
            }
            summary
                .messages
                .push(format!("  {}", archive.join(file).display()));
        }
    }

    /// Fingerprints whose committed entities are still in the catalog
    ///
    /// Entries for skipped groups have no entity and always count.
    async fn valid_history(&self) -> Result<HashSet<String>> {
        let catalog = self.ctx.catalog.as_ref();
        let mut valid = HashSet::new();

        for entry in self.state.history() {
            let current = match entry.entity {
                None => {
                    valid.insert(entry.fingerprint.clone());
                    continue;
                }
                Some(HistoryEntity::Album(id)) => {
                    catalog.get_album(id).await?.map(|a| a.identity_key())
                }
                Some(HistoryEntity::Item(id)) => {
                    catalog.get_item(id).await?.map(|i| i.identity_key())
                }
            };
            if current.is_some() && current == entry.identity {
                valid.insert(entry.fingerprint.clone());
            }
        }

        info!(
            valid = valid.len(),
            total = self.state.history().len(),
            "Loaded import history"
        );
        Ok(valid)
    }
}
