use cached_instances::adapters::build_backend;
use cached_instances::app::poll::{poll_queryset, poll_registry, PollStore};
use cached_instances::config::Command;
use cached_instances::utils::error::{CacheError, ErrorSeverity, Result};
use cached_instances::utils::requirements::{find_conflicts, read_requirements};
use cached_instances::utils::{logger, validation::Validate};
use cached_instances::{
    CacheConfig, CachedModel, CliConfig, InstanceCache, InvalidationMode, InvalidationQueue,
    ObjectSpec, Pk, UpdateTask,
};
use clap::Parser;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = CliConfig::parse();

    // 初始化日誌
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting cached-instances CLI");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    // 驗證參數
    if let Err(e) = cli.validate() {
        tracing::error!("❌ Argument validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    if let Err(e) = run(cli).await {
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

        eprintln!("❌ {}", e.user_friendly_message());
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 4,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        std::process::exit(exit_code);
    }

    Ok(())
}

async fn run(cli: CliConfig) -> Result<()> {
    if let Command::CheckRequirements { path } = &cli.command {
        return check_requirements(path);
    }

    let config = load_config(cli.config.as_deref())?;
    let store = Arc::new(PollStore::from_fixture(&cli.fixture)?);
    tracing::info!(fixture = %cli.fixture, "poll store loaded");

    let backend = build_backend(&config.backend)?;
    let registry = poll_registry(Arc::clone(&store), &config.cache.versions);
    let cache = Arc::new(InstanceCache::from_config(&config, backend, registry)?);
    if !cache.is_enabled() {
        tracing::warn!("instance cache is disabled, every read goes to the store");
    }

    match cli.command {
        Command::Get {
            model,
            pks,
            version,
        } => {
            let pks: Vec<Pk> = pks.iter().map(|raw| parse_pk(raw)).collect();
            let specs = pks
                .iter()
                .map(|pk| ObjectSpec::new(model.clone(), pk.clone()))
                .collect();
            let mut found = cache.get_instances(specs, version.as_deref()).await?;

            let mut rendered = Vec::with_capacity(pks.len());
            for pk in pks {
                match found.remove(&(model.clone(), pk.clone())) {
                    Some(entry) => {
                        rendered.push(CachedModel::new(model.clone(), entry.instance).to_json())
                    }
                    None => {
                        return Err(CacheError::DoesNotExist {
                            model,
                            pk: pk.to_string(),
                        })
                    }
                }
            }
            print_json(&serde_json::Value::Array(rendered))?;
        }
        Command::List { model } => {
            let mut queryset = poll_queryset(Arc::clone(&cache), Arc::clone(&store), &model)?;
            let instances = queryset.instances().await?;
            let rendered = instances.iter().map(CachedModel::to_json).collect();
            print_json(&serde_json::Value::Array(rendered))?;
        }
        Command::Update {
            model,
            pk,
            version,
            update_only,
        } => {
            let mut task = UpdateTask::new(model, parse_pk(&pk)).update_only(update_only);
            if let Some(version) = version {
                task = task.with_version(version);
            }
            run_update(cache, &config, task).await?;
        }
        Command::CheckRequirements { .. } => {}
    }

    tracing::info!(queries = store.query_count(), "✅ Command finished");
    Ok(())
}

fn load_config(path: Option<&str>) -> Result<CacheConfig> {
    let config = match path {
        Some(path) => {
            tracing::info!(path, "loading configuration");
            CacheConfig::from_file(path)?
        }
        None => {
            let mut config = CacheConfig::default();
            config.apply_env_overrides()?;
            config
        }
    };

    // 驗證配置
    config.validate()?;
    Ok(config)
}

async fn run_update(cache: Arc<InstanceCache>, config: &CacheConfig, task: UpdateTask) -> Result<()> {
    match config.invalidation.mode {
        InvalidationMode::Sync => {
            let report = cache
                .update_cascade(&task.model, &task.pk, task.version.as_deref(), task.update_only)
                .await?;
            println!(
                "✅ {} {} updated ({} updates, {} failed follow-ups)",
                task.model,
                task.pk,
                report.updated,
                report.failed.len()
            );
        }
        InvalidationMode::Async => {
            let (queue, handle) =
                InvalidationQueue::start(cache, config.invalidation.queue_settings());
            let label = format!("{} {}", task.model, task.pk);
            queue.enqueue(task).await?;
            queue.wait_idle().await;
            queue.shutdown(handle).await?;

            let stats = queue.stats();
            println!(
                "✅ {} updated ({} updates, {} failed tasks)",
                label, stats.updates, stats.failed
            );
        }
    }
    Ok(())
}

fn check_requirements(path: &str) -> Result<()> {
    let requirements = read_requirements(path)?;
    let conflicts = find_conflicts(&requirements);

    if let Some(conflict) = conflicts.first() {
        for conflict in &conflicts {
            tracing::error!(name = %conflict.name, pins = ?conflict.pins, "conflicting pins");
        }
        let (line, _) = conflict.pins.last().cloned().unwrap_or_default();
        return Err(CacheError::ManifestError {
            line,
            reason: format!(
                "{} package(s) pinned to conflicting versions, first: {}",
                conflicts.len(),
                conflict.name
            ),
        });
    }

    println!("✅ {} pinned requirements, no conflicts", requirements.len());
    Ok(())
}

fn parse_pk(raw: &str) -> Pk {
    raw.parse().unwrap_or_else(|never| match never {})
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
