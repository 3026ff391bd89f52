use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use meshvault::checklist::{self, ChecklistRouter};
use meshvault::cli::{Cli, Commands, OutputFormat, StorageModeArg};
use meshvault::config::{Config, StorageModeConfig};
use meshvault::download::{self, DownloadPipeline, DownloadProgress};
use meshvault::error::{DfsError, DfsResult};
use meshvault::key_manager::{get_default_keys_dir, KeyManager};
use meshvault::models::{FileMeta, StorageMode};
use meshvault::network::{self, NetworkEvent};
use meshvault::shard_store::ShardStore;
use meshvault::task_manager::TaskManager;
use meshvault::task_store::TaskStore;
use meshvault::temp_store::TempShardStore;
use meshvault::transport::{topics, TransportKind, TransportResponse};
use meshvault::upload::{self, UploadPipeline, UploadProgress};

#[tokio::main]
async fn main() {
    meshvault::logging::init_logging_safe();

    if let Err(e) = run().await {
        tracing::error!("fatal: {}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> DfsResult<()> {
    let cli = Cli::parse();
    let mut config = Config::load_or_default(cli.config_path.clone())?;
    if cli.port != 0 {
        config.network.default_port = cli.port;
    }
    if let (Some(peer), Some(addr)) = (cli.bootstrap_peer, cli.bootstrap_addr.clone()) {
        config.network.bootstrap_nodes.push(meshvault::config::BootstrapNode {
            peer_id: peer.to_string(),
            address: addr.to_string(),
        });
    }

    let keys_dir = cli.keys_dir.clone().or(config.storage.keys_dir.clone()).unwrap_or_else(get_default_keys_dir);
    let key_manager = Arc::new(KeyManager::load_or_create_default(&keys_dir, cli.key_name.as_deref())?);

    std::fs::create_dir_all(&config.storage.root_dir)?;
    let task_store = Arc::new(TaskStore::open(config.storage.root_dir.join("tasks.db"))?);
    let temp_store = Arc::new(TempShardStore::new(config.storage.root_dir.join("staging")).await?);
    let task_manager = Arc::new(TaskManager::new(config.storage.max_sessions, task_store.clone(), temp_store.clone()));
    task_manager.reconcile_on_startup().await?;

    let (network_handle, mut network_events) = network::spawn_network(&config).await?;
    let shard_store = Arc::new(
        ShardStore::new(config.storage.root_dir.join("slices"), &network_handle.local_peer_id.to_string()).await?,
    );
    let checklist_router = ChecklistRouter::new();
    network_handle.subscribe(topics::FILE_DOWNLOAD_REQUEST).await?;
    network_handle.subscribe(topics::FILE_DOWNLOAD_RESPONSE).await?;
    {
        let network_handle = network_handle.clone();
        let shard_store = shard_store.clone();
        let task_store = task_store.clone();
        let checklist_router = checklist_router.clone();
        let local_peer_id = network_handle.local_peer_id.to_string();
        tokio::spawn(async move {
            while let Some(event) = network_events.recv().await {
                match event {
                    NetworkEvent::TransportRequest { request, channel, .. } => {
                        let response = handle_inbound_transport_request(&shard_store, &task_store, &local_peer_id, request).await;
                        let _ = network_handle.respond_transport(channel, response).await;
                    }
                    NetworkEvent::GossipMessage { topic, data, .. } if topic == topics::FILE_DOWNLOAD_REQUEST => {
                        if let Err(e) =
                            checklist::handle_checklist_request(&shard_store, &task_store, &local_peer_id, &network_handle, &data)
                                .await
                        {
                            tracing::warn!("failed to answer download checklist request: {}", e);
                        }
                    }
                    NetworkEvent::GossipMessage { topic, data, .. } if topic == topics::FILE_DOWNLOAD_RESPONSE => {
                        match serde_json::from_slice(&data) {
                            Ok(response) => checklist_router.route(response).await,
                            Err(e) => tracing::warn!("malformed download checklist response: {}", e),
                        }
                    }
                    _ => {}
                }
            }
        });
    }

    let default_storage_mode = resolve_storage_mode(&config.storage.mode);

    match cli.command {
        Commands::NewUpload { path, storage_mode, k, m, ratio } => {
            let mode = resolve_storage_mode_arg(storage_mode, k, m, ratio);
            let created = create_upload_task(&path, mode, &key_manager, &task_store).await?;
            println!("created upload task {} for file {}", created.task_id, created.file_id);
        }
        Commands::TriggerUpload { task_id } => {
            run_upload(&task_id, &key_manager, &network_handle, &task_store, &temp_store, &task_manager, &config).await?;
        }
        Commands::PauseUpload { task_id } => task_manager.pause_upload(&task_id).await?,
        Commands::ResumeUpload { task_id } => task_manager.resume_upload(&task_id).await?,
        Commands::CancelUpload { task_id } => task_manager.cancel_upload(&task_id).await?,
        Commands::DeleteUpload { task_id } => task_manager.delete_upload(&task_id).await?,
        Commands::GetAllUploadFilesSummaries { format } => {
            print_upload_summaries(&task_store, format)?;
        }
        Commands::Download { file_id, output_path } => {
            run_download(
                &file_id,
                output_path,
                default_storage_mode,
                &key_manager,
                &checklist_router,
                &network_handle,
                &task_store,
                &temp_store,
                &task_manager,
                &config,
            )
            .await?;
        }
        Commands::PauseDownload { task_id } => task_manager.pause_download(&task_id).await?,
        Commands::ResumeDownload { task_id } => task_manager.resume_download(&task_id).await?,
        Commands::CancelDownload { task_id } => task_manager.cancel_download(&task_id).await?,
        Commands::Service { port } => {
            tracing::info!("running as service node on port {}", port);
            serve_forever().await;
        }
        Commands::Bootstrap { port } => {
            tracing::info!("running as bootstrap node on port {}", port);
            serve_forever().await;
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config).map_err(|e| DfsError::Config(e.to_string()))?);
        }
    }

    Ok(())
}

fn resolve_storage_mode(mode: &StorageModeConfig) -> StorageMode {
    match *mode {
        StorageModeConfig::File => StorageMode::File,
        StorageModeConfig::Slice => StorageMode::Slice,
        StorageModeConfig::RsSize { k, m } => StorageMode::RsSize { k, m },
        StorageModeConfig::RsProportion { ratio } => StorageMode::RsProportion { ratio },
    }
}

fn resolve_storage_mode_arg(mode_arg: StorageModeArg, k: Option<usize>, m: Option<usize>, ratio: Option<f64>) -> StorageMode {
    match mode_arg {
        StorageModeArg::File => StorageMode::File,
        StorageModeArg::Slice => StorageMode::Slice,
        StorageModeArg::RsSize => StorageMode::RsSize { k: k.unwrap_or(4), m: m.unwrap_or(2) },
        StorageModeArg::RsProportion => StorageMode::RsProportion { ratio: ratio.unwrap_or(0.5) },
    }
}

struct CreatedUpload {
    task_id: String,
    file_id: String,
}

/// Derives the content-addressed `file_id`: `hash(owner_pubkey_hash ||
/// sha256(file_bytes))`, so the same owner uploading the same bytes twice
/// always lands on the same file identity.
async fn create_upload_task(
    path: &std::path::Path,
    mode: StorageMode,
    key_manager: &KeyManager,
    task_store: &TaskStore,
) -> DfsResult<CreatedUpload> {
    let metadata = std::fs::metadata(path)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DfsError::Config("upload path has no file name".into()))?
        .to_string();

    let contents = tokio::fs::read(path).await?;
    let file_sha256 = meshvault::crypto::sha256(&contents);
    drop(contents);

    let owner_pubkey_hash = key_manager.pubkey_hash();
    let mut preimage = owner_pubkey_hash.into_bytes();
    preimage.extend_from_slice(&file_sha256);
    let file_id = hex::encode(meshvault::crypto::sha256(&preimage));

    let task_id = uuid::Uuid::new_v4().to_string();

    let record = upload::new_task_record(task_id.clone(), file_id.clone(), file_name, metadata.len() as i64, mode);
    task_store.insert_upload_task(&record)?;

    Ok(CreatedUpload { task_id, file_id })
}

async fn run_upload(
    task_id: &str,
    key_manager: &Arc<KeyManager>,
    network_handle: &network::NetworkHandle,
    task_store: &Arc<TaskStore>,
    temp_store: &Arc<TempShardStore>,
    task_manager: &Arc<TaskManager>,
    config: &Config,
) -> DfsResult<()> {
    let record = task_store
        .get_upload_task(task_id)?
        .ok_or_else(|| DfsError::NotFound(format!("no upload task {}", task_id)))?;

    let file_path = locate_source_file(&record.file_name)?;
    let (security, shares) = key_manager.build_file_security(config.security.shamir_n, config.security.shamir_k)?;
    let file_secret = security
        .encryption_secret
        .ok_or_else(|| DfsError::Crypto("missing freshly-generated file secret".into()))?;

    let plaintext = tokio::fs::read(&file_path).await?;
    let meta = FileMeta {
        file_id: record.file_id.clone(),
        name: record.file_name.clone(),
        extension: file_path.extension().and_then(|e| e.to_str()).unwrap_or("").to_string(),
        size: record.file_size,
        content_type: "application/octet-stream".to_string(),
        sha256_hash: hex::encode(meshvault::crypto::sha256(&plaintext)),
        upload_time: meshvault::util::now_unix(),
    };
    drop(plaintext);

    let pipeline = UploadPipeline {
        task_id: record.task_id.clone(),
        file_path,
        storage_mode: record.storage_mode,
        shamir_n: config.security.shamir_n,
        shamir_k: config.security.shamir_k,
        max_workers_per_peer: config.network.max_workers_per_peer,
        max_global_workers: config.network.max_global_workers,
        key_manager: key_manager.clone(),
        network: network_handle.clone(),
        task_store: task_store.clone(),
        temp_store: temp_store.clone(),
        shard_size: config.storage.shard_size,
        max_slice_size: config.storage.max_slice_size,
        min_slice_size: config.storage.min_slice_size,
    };

    let owner_security = (security.p2pkh_script.clone(), security.p2pk_script.clone());
    let mut progress_rx = task_manager.spawn_upload(pipeline, meta, file_secret, shares, owner_security).await?;

    while let Some(progress) = progress_rx.recv().await {
        match progress {
            UploadProgress::ShardStored { segment_index, peer } => println!("shard {} stored on {}", segment_index, peer),
            UploadProgress::Completed { file_id } => println!("upload complete, file id {}", file_id),
            UploadProgress::Failed { reason } => println!("upload failed: {}", reason),
            UploadProgress::Paused => println!("upload paused"),
            UploadProgress::Cancelled => println!("upload cancelled"),
        }
    }
    task_manager.retire(task_id).await;
    Ok(())
}

fn locate_source_file(file_name: &str) -> DfsResult<PathBuf> {
    let path = PathBuf::from(file_name);
    if path.exists() {
        Ok(path)
    } else {
        Err(DfsError::NotFound(format!("source file {} no longer exists at its original path", file_name)))
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_download(
    file_id: &str,
    output_path: PathBuf,
    storage_mode: StorageMode,
    key_manager: &Arc<KeyManager>,
    checklist_router: &ChecklistRouter,
    network_handle: &network::NetworkHandle,
    task_store: &Arc<TaskStore>,
    temp_store: &Arc<TempShardStore>,
    task_manager: &Arc<TaskManager>,
    config: &Config,
) -> DfsResult<()> {
    let task_id = uuid::Uuid::new_v4().to_string();
    let record = download::new_task_record(task_id.clone(), file_id.to_string(), output_path.display().to_string());
    task_store.insert_download_task(&record)?;

    let pipeline = DownloadPipeline::new(
        task_id.clone(),
        file_id.to_string(),
        output_path,
        storage_mode,
        config.security.shamir_k,
        key_manager.pubkey_hash(),
        network_handle.clone(),
        task_store.clone(),
        temp_store.clone(),
        checklist_router.clone(),
        config.storage.max_retries,
        config.storage.retry_interval(),
    );

    let mut progress_rx = task_manager.spawn_download(pipeline).await?;
    while let Some(progress) = progress_rx.recv().await {
        match progress {
            DownloadProgress::PieceRetrieved { segment_index } => println!("retrieved shard {}", segment_index),
            DownloadProgress::Completed { path } => println!("download complete: {}", path.display()),
            DownloadProgress::Failed { reason } => println!("download failed: {}", reason),
            DownloadProgress::Cancelled => println!("download cancelled"),
        }
    }
    task_manager.retire(&task_id).await;
    Ok(())
}

fn print_upload_summaries(task_store: &TaskStore, format: OutputFormat) -> DfsResult<()> {
    let tasks = task_store.list_upload_tasks()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tasks)?),
        OutputFormat::Table => {
            println!("{:<36} {:<20} {:<12} {:<10}", "TASK ID", "FILE", "SIZE", "STATUS");
            for task in &tasks {
                println!("{:<36} {:<20} {:<12} {:?}", task.task_id, task.file_name, task.file_size, task.status);
            }
        }
    }
    Ok(())
}

/// Serves one inbound `TransportRequest` from a peer: `Send` parses and
/// verifies the shard envelope before this node agrees to custody it,
/// `Forward` returns a previously-stored one, and `Delete` drops it
/// (spec.md §4.10 custodian storage layout).
async fn handle_inbound_transport_request(
    shard_store: &ShardStore,
    task_store: &TaskStore,
    local_peer_id: &str,
    request: meshvault::transport::TransportRequest,
) -> TransportResponse {
    match request.kind {
        TransportKind::Send => {
            let envelope = match meshvault::envelope::decode_envelope(&request.data) {
                Ok(envelope) => envelope,
                Err(e) => return TransportResponse::error(format!("malformed shard envelope: {}", e)),
            };
            if let Err(e) = meshvault::envelope::verify_envelope(&envelope) {
                return TransportResponse::error(format!("shard envelope failed verification: {}", e));
            }
            if let Err(e) = shard_store.store(&request.file_id, &request.segment_id, &request.data).await {
                return TransportResponse::error(e.to_string());
            }
            let record = meshvault::models::FileSegmentStorage {
                file_id: request.file_id.clone(),
                segment_index: request.segment_index,
                segment_id: request.segment_id.clone(),
                peer_id: local_peer_id.to_string(),
            };
            match task_store.record_file_segment_storage(&record) {
                Ok(()) => TransportResponse::ok(Vec::new()),
                Err(e) => TransportResponse::error(e.to_string()),
            }
        }
        TransportKind::Forward => match shard_store.fetch(&request.file_id, &request.segment_id).await {
            Ok(data) => TransportResponse::ok(data),
            Err(_) => TransportResponse::not_found(format!("no shard {}/{}", request.file_id, request.segment_id)),
        },
        TransportKind::Delete => match shard_store.delete(&request.file_id, &request.segment_id).await {
            Ok(()) => TransportResponse::ok(Vec::new()),
            Err(e) => TransportResponse::error(e.to_string()),
        },
    }
}

/// Runs until interrupted; inbound shard send/forward/delete requests are
/// served by the background task spawned in `run`.
async fn serve_forever() {
    tokio::signal::ctrl_c().await.ok();
    tracing::info!("shutting down");
}
