//! Generate command implementation.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::aggregator::Aggregator;
use crate::cache::{get_or_miss, open_caches, put_or_log, SharedCache};
use crate::cli::GenerateArgs;
use crate::config::{CacheBackend, Config};
use crate::fetcher::{Fetcher, FetcherOptions};
use crate::render::RenderOptions;
use crate::request::GenerateRequest;

/// Run the generate command
pub async fn run(args: GenerateArgs, config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let request = build_request(&args, &config);
    let (source_cache, result_cache) = open_caches(&config.cache);
    let script = generate(&request, &config, source_cache, result_cache, args.no_cache).await?;

    match &args.output {
        Some(path) => {
            write_script(path, &script)?;
            info!("Script written to {:?}", path);
        }
        None => print!("{}", script),
    }

    Ok(())
}

/// Turn command line arguments into a request.
///
/// Without `--sources`, the enabled catalogue sources are used.
pub fn build_request(args: &GenerateArgs, config: &Config) -> GenerateRequest {
    let sources = args.sources.clone().unwrap_or_else(|| {
        config
            .enabled_sources()
            .iter()
            .map(|source| source.uri.as_str())
            .collect::<Vec<_>>()
            .join(",")
    });

    GenerateRequest {
        sources,
        excluded_hosts: args.exclude.clone(),
        redirect_to: args.redirect_to.clone(),
        limit: args.limit,
        format: args.format.clone(),
        version: args.version_tag.clone(),
    }
}

/// Validate a request and produce its script, going through the result cache.
///
/// With `skip_lookup` the cached script is ignored but the fresh one still
/// replaces it.
pub async fn generate(
    request: &GenerateRequest,
    config: &Config,
    source_cache: SharedCache,
    result_cache: SharedCache,
    skip_lookup: bool,
) -> Result<String> {
    request.validate(&config.limits)?;
    let format = request.script_format()?;

    let key = request.cache_key();
    if !skip_lookup {
        if let Some(script) = get_or_miss(result_cache.as_ref(), &key) {
            info!("Serving script from result cache");
            return Ok(script);
        }
    }

    let fetcher = Fetcher::new(FetcherOptions::from_config(config), source_cache)?;

    let cache_state = if config.cache.backend == CacheBackend::Disabled {
        "disabled"
    } else {
        "enabled"
    };
    let mut aggregator = Aggregator::new()
        .with_concurrency(config.limits.max_concurrent_fetches)
        .add_comment(format!(
            "Sources cache state: {}, *response* cache lifetime: {}",
            cache_state, config.cache.result_ttl_secs
        ));

    aggregator = match &request.excluded_hosts {
        Some(hosts) => aggregator.add_excluded_hosts(hosts),
        None => aggregator.add_excluded_host_list(&config.defaults.excluded_hosts),
    };

    aggregator = aggregator.add_source(&request.sources).redirect_to(
        request
            .redirect_to
            .as_deref()
            .unwrap_or(&config.defaults.redirect_ip),
    );

    if aggregator.sources().is_empty() {
        warn!("None of the requested sources is a valid URI");
    }
    debug!(
        "Generating from {} sources, {} excluded hosts",
        aggregator.sources().len(),
        aggregator.excluded_hosts().len()
    );

    let aggregator = aggregator.run(&fetcher).await;

    let options = RenderOptions {
        limit: request.limit.unwrap_or(config.limits.result_entries),
        tag: config.defaults.comment.clone(),
        format,
    };
    let script = aggregator.render(&options);

    put_or_log(
        result_cache.as_ref(),
        &key,
        &script,
        config.cache.result_ttl(),
    );

    Ok(script)
}

/// Write the script atomically
fn write_script(path: &Path, script: &str) -> Result<()> {
    let parent_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .with_context(|| format!("Failed to create temporary file in {:?}", parent_dir))?;

    temp_file.write_all(script.as_bytes())?;
    temp_file.as_file().sync_all()?;

    temp_file
        .persist(path)
        .with_context(|| format!("Failed to write script to {:?}", path))?;

    Ok(())
}
