//! Import pipeline
//!
//! Work flows through four stages:
//!
//! 1. **Discovery**: [`TaskFactory`] walks a top-level path and yields tasks
//! 2. **Lookup**: candidates are fetched, several tasks at a time
//! 3. **Choice**: the [`ChoiceSource`] decides, duplicates are resolved
//! 4. **Commit**: files are placed, the catalog is updated, progress saved
//!
//! In threaded mode the stages run concurrently over bounded queues. Lookups
//! may finish out of order but are forwarded in discovery order, and only
//! one commit runs at a time, so the catalog sees tasks in the order they
//! were found. Sequential mode calls the same stage functions inline.

use shelf_core::types::Item;
use shelf_core::{Catalog, MetadataSource, TagCodec};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::choice::{apply_choice, ChoiceSource};
use crate::copy::{prune_empty_dirs, transfer, FileOperation};
use crate::duplicates::{
    carry_over_album, carry_over_item, find_duplicates, merge_into_album, remove_duplicates,
    Duplicates, Resolution,
};
use crate::events::{ImportEvent, Observers};
use crate::import_log::ImportLog;
use crate::progress::{fingerprint, progress_key, HistoryEntity, HistoryEntry, StateStore};
use crate::ranker::CandidateRanker;
use crate::scanner::{AlbumGrouper, AlbumGroups, MediaGroup};
use crate::task::{is_archive, Action, ImportTask, TaskState};
use crate::types::{ImportConfig, ImportSummary};
use crate::{ImportError, Result};

/// Something found under a top-level path
#[derive(Debug)]
pub enum Discovery {
    Task(ImportTask),
    /// The path held nothing importable
    Empty(PathBuf),
}

/// Collaborators shared by every stage
#[derive(Clone)]
pub(crate) struct PipelineContext {
    pub(crate) config: Arc<ImportConfig>,
    pub(crate) catalog: Arc<dyn Catalog>,
    pub(crate) codec: Arc<dyn TagCodec>,
    pub(crate) source: Arc<dyn MetadataSource>,
    pub(crate) ranker: Arc<CandidateRanker>,
    pub(crate) grouper: AlbumGrouper,
    pub(crate) observers: Observers,
}

enum Walk {
    Start,
    Albums(AlbumGroups),
    Singletons(Box<dyn Iterator<Item = PathBuf> + Send>),
    File(Option<PathBuf>),
    Finished,
}

enum Found {
    Group(MediaGroup),
    File(PathBuf),
}

/// Lazily turns one top-level path into import tasks
///
/// Groups already done according to `done`, or whose content fingerprint is
/// in the incremental history, are not yielded. An archive is unpacked
/// first; its task comes last so that committing it removes the extraction
/// directory after all of its groups.
pub struct TaskFactory {
    toppath: PathBuf,
    scan_root: PathBuf,
    grouper: AlbumGrouper,
    codec: Arc<dyn TagCodec>,
    singletons: bool,
    done: BTreeSet<String>,
    history: Option<Arc<HashSet<String>>>,
    walk: Walk,
    archive: Option<ImportTask>,
    found_any: bool,
    reported_empty: bool,
}

impl TaskFactory {
    pub fn new(
        toppath: PathBuf,
        grouper: AlbumGrouper,
        codec: Arc<dyn TagCodec>,
        singletons: bool,
    ) -> Self {
        Self {
            scan_root: toppath.clone(),
            toppath,
            grouper,
            codec,
            singletons,
            done: BTreeSet::new(),
            history: None,
            walk: Walk::Start,
            archive: None,
            found_any: false,
            reported_empty: false,
        }
    }

    /// Skip groups whose progress keys are all in `done`
    pub fn with_done(mut self, done: BTreeSet<String>) -> Self {
        self.done = done;
        self
    }

    /// Skip groups whose fingerprint is in `history`, and fingerprint the rest
    pub fn with_history(mut self, history: Arc<HashSet<String>>) -> Self {
        self.history = Some(history);
        self
    }

    fn start(&mut self) {
        let toppath = self.toppath.clone();

        if is_archive(&toppath) {
            let mut archive = ImportTask::archive(toppath.clone());
            match archive.extract() {
                Ok(root) => {
                    self.scan_root = root.to_path_buf();
                    self.walk = self.dir_walk();
                }
                Err(e) => {
                    warn!(archive = %toppath.display(), "Extraction failed: {}", e);
                    self.walk = Walk::Finished;
                }
            }
            self.archive = Some(archive);
        } else if toppath.is_dir() {
            self.walk = self.dir_walk();
        } else if toppath.is_file() {
            if let Some(parent) = toppath.parent() {
                self.scan_root = parent.to_path_buf();
            }
            self.walk = Walk::File(Some(toppath));
        } else {
            warn!(path = %toppath.display(), "Import path does not exist");
            self.walk = Walk::Finished;
        }
    }

    fn dir_walk(&self) -> Walk {
        if self.singletons {
            Walk::Singletons(Box::new(self.grouper.singletons_in_dir(&self.scan_root)))
        } else {
            Walk::Albums(self.grouper.albums_in_dir(&self.scan_root))
        }
    }

    fn next_found(&mut self) -> Option<Found> {
        match &mut self.walk {
            Walk::Albums(groups) => groups.next().map(Found::Group),
            Walk::Singletons(files) => files.next().map(Found::File),
            Walk::File(file) => file.take().map(Found::File),
            Walk::Start | Walk::Finished => None,
        }
    }

    fn from_archive(&self) -> bool {
        self.archive.is_some()
    }

    fn already_done(&self, keys: &[String]) -> bool {
        !keys.is_empty() && keys.iter().all(|k| self.done.contains(k))
    }

    /// Fingerprint `files`; `Err(())` means the group was imported before
    fn check_history(&self, files: &[PathBuf]) -> std::result::Result<Option<String>, ()> {
        let Some(history) = &self.history else {
            return Ok(None);
        };
        match fingerprint(&self.scan_root, files) {
            Ok(fp) if history.contains(&fp) => Err(()),
            Ok(fp) => Ok(Some(fp)),
            Err(e) => {
                warn!("Could not fingerprint {:?}: {}", files.first(), e);
                Ok(None)
            }
        }
    }

    fn read_items(&self, files: &[PathBuf]) -> Vec<Item> {
        files
            .iter()
            .filter_map(|path| match self.codec.read(path) {
                Ok(meta) => Some(Item::new(path.clone(), meta)),
                Err(e) => {
                    warn!(path = %path.display(), "Skipping unreadable file: {}", e);
                    None
                }
            })
            .collect()
    }

    fn album_task(&mut self, group: MediaGroup) -> Option<ImportTask> {
        self.found_any = true;
        let mut task = ImportTask::album(
            self.toppath.clone(),
            self.scan_root.clone(),
            group.roots,
            Vec::new(),
        );
        task.from_archive = self.from_archive();

        if self.already_done(&task.progress_keys) {
            info!(paths = ?task.paths(), "Skipping group finished by an earlier run");
            return None;
        }
        let Ok(fp) = self.check_history(&group.files) else {
            info!(paths = ?task.paths(), "Skipping previously imported group");
            return None;
        };
        task.fingerprint = fp;

        task.items = self.read_items(&group.files);
        (!task.items.is_empty()).then_some(task)
    }

    fn file_task(&mut self, path: PathBuf) -> Option<ImportTask> {
        self.found_any = true;
        let key = progress_key(&self.scan_root, &path);

        if self.already_done(std::slice::from_ref(&key)) {
            info!(path = %path.display(), "Skipping file finished by an earlier run");
            return None;
        }
        let Ok(fp) = self.check_history(std::slice::from_ref(&path)) else {
            info!(path = %path.display(), "Skipping previously imported file");
            return None;
        };

        let item = self.read_items(std::slice::from_ref(&path)).pop()?;
        let mut task = if self.singletons {
            ImportTask::singleton(self.toppath.clone(), self.scan_root.clone(), item)
        } else {
            ImportTask::album(
                self.toppath.clone(),
                self.scan_root.clone(),
                vec![path],
                vec![item],
            )
        };
        task.from_archive = self.from_archive();
        task.fingerprint = fp;
        Some(task)
    }

    fn finish(&mut self) -> Option<Discovery> {
        if !self.found_any && !self.reported_empty {
            self.reported_empty = true;
            return Some(Discovery::Empty(self.toppath.clone()));
        }
        self.archive.take().map(Discovery::Task)
    }
}

impl Iterator for TaskFactory {
    type Item = Discovery;

    fn next(&mut self) -> Option<Discovery> {
        loop {
            match self.walk {
                Walk::Start => {
                    self.start();
                    continue;
                }
                Walk::Finished => return self.finish(),
                _ => {}
            }

            let task = match self.next_found() {
                Some(Found::Group(group)) => self.album_task(group),
                Some(Found::File(path)) => self.file_task(path),
                None => {
                    self.walk = Walk::Finished;
                    None
                }
            };
            if let Some(task) = task {
                return Some(Discovery::Task(task));
            }
        }
    }
}

/// Lookup stage for one discovery
///
/// Album tasks are first split by album artist and album when configured.
pub(crate) async fn lookup(ctx: &PipelineContext, discovery: Discovery) -> Vec<Discovery> {
    let task = match discovery {
        Discovery::Task(task) if !task.kind().needs_extraction => task,
        other => return vec![other],
    };

    let mut tasks = if ctx.config.group_albums && task.is_album() {
        task.group_albums()
    } else {
        vec![task]
    };

    if ctx.config.autotag {
        for task in &mut tasks {
            task.lookup_candidates(ctx.source.as_ref(), &ctx.ranker, &ctx.config.search_ids)
                .await;
        }
    }
    tasks.into_iter().map(Discovery::Task).collect()
}

/// Choice stage for one discovery
///
/// Splitting choices expand into subtasks, each looked up and decided in
/// turn. Returned tasks have their metadata applied and duplicates resolved.
pub(crate) async fn choose(
    ctx: &PipelineContext,
    choices: &mut dyn ChoiceSource,
    discovery: Discovery,
) -> Result<Vec<Discovery>> {
    let task = match discovery {
        Discovery::Task(task) if !task.kind().needs_extraction => task,
        other => return Ok(vec![other]),
    };

    let mut ready = Vec::new();
    // (task, produced by a split)
    let mut queue = VecDeque::from([(task, false)]);

    while let Some((mut task, split)) = queue.pop_front() {
        if split && ctx.config.autotag {
            task.lookup_candidates(ctx.source.as_ref(), &ctx.ranker, &ctx.config.search_ids)
                .await;
        }
        decide(ctx, choices, &mut task, split).await?;

        let subtasks = match task.choice() {
            Some(Action::Tracks) => task.split_into_singletons(),
            Some(Action::Albums) => task.group_albums(),
            _ => {
                resolve_duplicates(ctx, choices, &mut task).await?;
                ready.push(Discovery::Task(task));
                continue;
            }
        };
        debug!(count = subtasks.len(), "Split task");
        for subtask in subtasks.into_iter().rev() {
            queue.push_front((subtask, true));
        }
    }

    Ok(ready)
}

async fn decide(
    ctx: &PipelineContext,
    choices: &mut dyn ChoiceSource,
    task: &mut ImportTask,
    split: bool,
) -> Result<()> {
    if ctx.config.autotag {
        let choice = if task.is_album() {
            choices.choose_album(task).await
        } else {
            choices.choose_item(task).await
        };
        if let Err(e) = apply_choice(task, choice) {
            warn!(paths = ?task.paths(), "Skipping task after invalid choice: {}", e);
            task.set_choice(Action::Skip)?;
        }
        // A regrouped task cannot be regrouped again
        if split && matches!(task.choice(), Some(Action::Albums)) {
            task.clear_choice();
            task.set_choice(Action::AsIs)?;
        }
    } else {
        task.set_choice(Action::AsIs)?;
    }

    let action = task.choice().map_or("skip", Action::name);
    ctx.observers.notify(&ImportEvent::TaskChoice {
        paths: task.paths().to_vec(),
        action,
    })
}

/// Apply metadata for the chosen action, then look for duplicates
async fn resolve_duplicates(
    ctx: &PipelineContext,
    choices: &mut dyn ChoiceSource,
    task: &mut ImportTask,
) -> Result<()> {
    if task.is_skipped() {
        return Ok(());
    }

    let config = &ctx.config;
    task.apply_metadata(config.from_scratch);
    task.align_album_level_fields(&config.va_name, config.single_artist_ratio);
    task.apply_set_fields(&config.set_fields);

    if !config.autotag {
        return Ok(());
    }

    if let Some(duplicates) =
        find_duplicates(ctx.catalog.as_ref(), task, &config.duplicate_keys).await?
    {
        let resolution = choices.resolve_duplicate(task, &duplicates).await;
        info!(
            resolution = resolution.name(),
            count = duplicates.len(),
            paths = ?task.paths(),
            "Duplicate resolved"
        );
        ctx.observers.notify(&ImportEvent::DuplicateResolved {
            paths: task.paths().to_vec(),
            resolution,
        })?;
        task.duplicates = Some(duplicates);
        task.resolution = Some(resolution);
    }
    task.advance(TaskState::DuplicateChecked)
}

/// Operation used for one file
fn effective_operation(
    configured: FileOperation,
    from_archive: bool,
    source: &Path,
    library_dir: &Path,
) -> FileOperation {
    if from_archive {
        FileOperation::Copy
    } else if configured == FileOperation::Copy && source.starts_with(library_dir) {
        // Re-imports of library files are moved into place
        FileOperation::Move
    } else {
        configured
    }
}

/// Commit stage: the only writer of the catalog and the state file
pub(crate) struct Committer<'a> {
    ctx: &'a PipelineContext,
    state: &'a mut StateStore,
    log: &'a mut ImportLog,
    summary: &'a mut ImportSummary,
}

impl<'a> Committer<'a> {
    pub(crate) fn new(
        ctx: &'a PipelineContext,
        state: &'a mut StateStore,
        log: &'a mut ImportLog,
        summary: &'a mut ImportSummary,
    ) -> Self {
        Self {
            ctx,
            state,
            log,
            summary,
        }
    }

    pub(crate) async fn commit(&mut self, discovery: Discovery) -> Result<()> {
        match discovery {
            Discovery::Empty(path) => {
                info!(path = %path.display(), "Nothing to import");
                self.summary
                    .messages
                    .push(format!("No files imported from {}", path.display()));
                Ok(())
            }
            Discovery::Task(mut task) => {
                let result = self.commit_task(&mut task).await;
                if result.is_err() && task.state().can_advance_to(TaskState::Aborted) {
                    task.advance(TaskState::Aborted)?;
                }
                task.finalize();
                result
            }
        }
    }

    async fn commit_task(&mut self, task: &mut ImportTask) -> Result<()> {
        if task.kind().needs_extraction {
            return Ok(());
        }
        if task.is_skipped() {
            return self.skip(task, "skip");
        }

        match (task.resolution, &task.duplicates) {
            (Some(Resolution::Skip), _) => {
                self.summary.duplicates_resolved += 1;
                return self.skip(task, "duplicate-skip");
            }
            (Some(Resolution::Remove), Some(duplicates)) => {
                self.log.record("duplicate-replace", task.paths());
                remove_duplicates(
                    self.ctx.catalog.as_ref(),
                    duplicates,
                    self.ctx.config.library_dir.as_deref(),
                    &[],
                )
                .await?;
            }
            (Some(Resolution::Merge), _) => self.log.record("duplicate-merge", task.paths()),
            (Some(Resolution::KeepBoth), _) => self.log.record("duplicate-keep", task.paths()),
            _ => {}
        }
        if task.resolution.is_some() {
            self.summary.duplicates_resolved += 1;
        }
        if matches!(task.choice(), Some(Action::AsIs)) {
            self.log.record("asis", task.paths());
        }

        // Entries at the same source paths are being re-imported
        let sources: Vec<PathBuf> = task.items.iter().map(|i| i.path.clone()).collect();
        task.replaced = self.ctx.catalog.items_by_paths(&sources).await?;
        for item in &mut task.items {
            if let Some(old) = task.replaced.iter().find(|old| old.path == item.path) {
                carry_over_item(item, old);
            }
        }

        self.place_files(task)?;
        let event = self.store(task).await?;

        self.record_done(task)?;
        self.ctx.observers.notify(&event)
    }

    fn skip(&mut self, task: &mut ImportTask, status: &str) -> Result<()> {
        self.log.record(status, task.paths());
        self.summary.skipped += 1;
        if task.state() != TaskState::Skipped {
            task.advance(TaskState::Skipped)?;
        }

        let config = &self.ctx.config;
        if config.incremental && !config.incremental_skip_later {
            if let Some(fingerprint) = task.fingerprint.clone() {
                self.state.history_add(HistoryEntry {
                    fingerprint,
                    entity: None,
                    identity: None,
                });
            }
        }
        self.state.progress_add(task.toppath(), &task.progress_keys);
        self.state.save()
    }

    /// Transfer every item into the library and optionally write its tags
    fn place_files(&mut self, task: &mut ImportTask) -> Result<()> {
        let config = &self.ctx.config;
        let singleton = !task.is_album();
        let from_archive = task.from_archive;
        let toppath = task.toppath().to_path_buf();

        for item in &mut task.items {
            let source = item.path.clone();
            let (operation, dest) = match &config.library_dir {
                Some(library_dir) => (
                    effective_operation(config.operation, from_archive, &source, library_dir),
                    config
                        .layout
                        .destination(library_dir, &item.meta, &source, singleton),
                ),
                None if from_archive => {
                    return Err(ImportError::UnsupportedOperation(
                        "archive imports need a library directory".to_string(),
                    ))
                }
                None => (FileOperation::None, source.clone()),
            };

            let dest = transfer(operation, &source, &dest)?;
            if dest != source {
                match operation {
                    FileOperation::Copy if config.delete && !from_archive => {
                        fs::remove_file(&source)?;
                        if let Some(parent) = source.parent() {
                            prune_empty_dirs(parent, &toppath);
                        }
                    }
                    FileOperation::Move => {
                        if let Some(parent) = source.parent() {
                            prune_empty_dirs(parent, &toppath);
                        }
                    }
                    _ => {}
                }
                self.ctx.observers.notify(&ImportEvent::FileTransferred {
                    operation,
                    source: source.clone(),
                    dest: dest.clone(),
                })?;
            }
            item.path = dest;

            if config.write {
                if let Err(e) = self.ctx.codec.write(&item.path, &item.meta) {
                    warn!(path = %item.path.display(), "Could not write tags: {}", e);
                }
            }
        }

        task.advance(TaskState::Manipulated)
    }

    /// Replace re-imported entries and add the task to the catalog
    async fn store(&mut self, task: &mut ImportTask) -> Result<ImportEvent> {
        let catalog = self.ctx.catalog.as_ref();

        let mut old_album = None;
        for old in &task.replaced {
            if old_album.is_none() {
                if let Some(album_id) = old.album_id {
                    old_album = catalog.get_album(album_id).await?;
                }
            }
            if let Some(id) = old.id {
                catalog.remove_item(id).await?;
            }
        }

        let event = if task.is_album() {
            let Some(mut album) = task.album_record() else {
                return Err(ImportError::InvalidChoice(format!(
                    "no items left to import from {:?}",
                    task.paths()
                )));
            };
            if let Some(old) = &old_album {
                carry_over_album(&mut album, old);
            }

            let merged = match (task.resolution, &task.duplicates) {
                (Some(Resolution::Merge), Some(Duplicates::Albums(duplicates))) => {
                    merge_into_album(catalog, duplicates, &album, &task.items).await?
                }
                _ => None,
            };
            let album_id = match merged {
                Some(id) => id,
                None => catalog.add_album(&album, &task.items).await?,
            };
            album.id = Some(album_id);

            let items = catalog.album_items(album_id).await?;
            self.summary.albums_imported += 1;
            self.summary.items_imported += task.items.len();
            task.stored = Some(HistoryEntity::Album(album_id));
            info!(album_id, album = %album.album, items = task.items.len(), "Imported album");
            ImportEvent::AlbumImported { album, items }
        } else {
            let Some(item) = task.items.first_mut() else {
                return Err(ImportError::InvalidChoice(format!(
                    "no item to import from {:?}",
                    task.paths()
                )));
            };
            if let (Some(Resolution::Merge), Some(Duplicates::Items(duplicates))) =
                (task.resolution, &task.duplicates)
            {
                for duplicate in duplicates {
                    carry_over_item(item, duplicate);
                    if let Some(id) = duplicate.id {
                        catalog.remove_item(id).await?;
                    }
                }
            }

            let id = catalog.add_item(item).await?;
            item.id = Some(id);
            self.summary.items_imported += 1;
            task.stored = Some(HistoryEntity::Item(id));
            info!(item_id = id, path = %item.path.display(), "Imported item");
            ImportEvent::ItemImported { item: item.clone() }
        };

        task.advance(TaskState::Stored)?;
        Ok(event)
    }

    /// Persist progress and history for a stored task
    fn record_done(&mut self, task: &ImportTask) -> Result<()> {
        if self.ctx.config.incremental {
            if let Some(fingerprint) = task.fingerprint.clone() {
                let identity = match task.stored {
                    Some(HistoryEntity::Album(_)) => task.album_record().map(|a| a.identity_key()),
                    Some(HistoryEntity::Item(_)) => task.items.first().map(Item::identity_key),
                    None => None,
                };
                self.state.history_add(HistoryEntry {
                    fingerprint,
                    entity: task.stored,
                    identity,
                });
            }
        }
        self.state.progress_add(task.toppath(), &task.progress_keys);
        self.state.save()
    }
}

/// Run every stage inline, one task at a time
pub(crate) async fn run_sequential(
    factory: TaskFactory,
    ctx: &PipelineContext,
    choices: &mut dyn ChoiceSource,
    committer: &mut Committer<'_>,
) -> Result<()> {
    for discovery in factory {
        for found in lookup(ctx, discovery).await {
            for chosen in choose(ctx, choices, found).await? {
                committer.commit(chosen).await?;
            }
        }
    }
    Ok(())
}

/// Run the stages concurrently over bounded queues
pub(crate) async fn run_threaded(
    factory: TaskFactory,
    ctx: &PipelineContext,
    choices: &mut dyn ChoiceSource,
    committer: &mut Committer<'_>,
) -> Result<()> {
    let cancel = CancellationToken::new();
    let capacity = ctx.config.queue_size;
    let (found_tx, found_rx) = mpsc::channel(capacity);
    let (looked_tx, looked_rx) = mpsc::channel(capacity);
    let (chosen_tx, chosen_rx) = mpsc::channel(capacity);

    let discovery = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || {
            for found in factory {
                if cancel.is_cancelled() || found_tx.blocking_send(found).is_err() {
                    break;
                }
            }
        }
    });
    let lookups = tokio::spawn(lookup_stage(
        ctx.clone(),
        found_rx,
        looked_tx,
        cancel.clone(),
    ));

    let (chosen, committed) = tokio::join!(
        choose_stage(ctx, choices, looked_rx, chosen_tx, &cancel),
        commit_stage(committer, chosen_rx, &cancel),
    );

    cancel.cancel();
    if let Err(e) = lookups.await {
        warn!("Lookup stage ended abnormally: {}", e);
    }
    if let Err(e) = discovery.await {
        warn!("Discovery stage ended abnormally: {}", e);
    }

    committed?;
    chosen
}

async fn lookup_stage(
    ctx: PipelineContext,
    mut rx: mpsc::Receiver<Discovery>,
    tx: mpsc::Sender<Discovery>,
    cancel: CancellationToken,
) {
    let workers = ctx.config.lookup_workers;
    let mut pending: VecDeque<JoinHandle<Vec<Discovery>>> = VecDeque::new();

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some(discovery) = next else {
            // Upstream finished: drain what is still running
            while !pending.is_empty() {
                if !forward_oldest(&mut pending, &tx).await {
                    break;
                }
            }
            break;
        };

        let worker_ctx = ctx.clone();
        pending.push_back(tokio::spawn(async move {
            lookup(&worker_ctx, discovery).await
        }));
        if pending.len() >= workers && !forward_oldest(&mut pending, &tx).await {
            break;
        }
    }

    for handle in pending {
        handle.abort();
    }
}

/// Wait for the oldest lookup and pass its tasks on
///
/// Returns false once downstream has gone away.
async fn forward_oldest(
    pending: &mut VecDeque<JoinHandle<Vec<Discovery>>>,
    tx: &mpsc::Sender<Discovery>,
) -> bool {
    let Some(handle) = pending.pop_front() else {
        return true;
    };
    match handle.await {
        Ok(found) => {
            for discovery in found {
                if tx.send(discovery).await.is_err() {
                    return false;
                }
            }
            true
        }
        Err(e) => {
            tracing::error!("Lookup worker failed: {}", e);
            true
        }
    }
}

async fn choose_stage(
    ctx: &PipelineContext,
    choices: &mut dyn ChoiceSource,
    mut rx: mpsc::Receiver<Discovery>,
    tx: mpsc::Sender<Discovery>,
    cancel: &CancellationToken,
) -> Result<()> {
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            next = rx.recv() => next,
        };
        let Some(discovery) = next else {
            return Ok(());
        };

        let chosen = match choose(ctx, choices, discovery).await {
            Ok(chosen) => chosen,
            Err(e) => {
                cancel.cancel();
                return Err(e);
            }
        };
        for discovery in chosen {
            if tx.send(discovery).await.is_err() {
                return Ok(());
            }
        }
    }
}

async fn commit_stage(
    committer: &mut Committer<'_>,
    mut rx: mpsc::Receiver<Discovery>,
    cancel: &CancellationToken,
) -> Result<()> {
    while let Some(discovery) = rx.recv().await {
        if let Err(e) = committer.commit(discovery).await {
            cancel.cancel();
            return Err(e);
        }
    }
    Ok(())
}
