//! Repeated-application timing.

use std::time::{Duration, Instant};

use dt_core::{ApplyContext, ThemeCache, ThemeLog};

use crate::fetcher::LayeredFetcher;
use crate::input;

const WARMUP_ITERATIONS: usize = 10;

#[derive(Debug)]
struct BenchResult {
    iterations: usize,
    total_ms: f64,
    avg_us: f64,
    p50_us: f64,
    p95_us: f64,
    p99_us: f64,
    ops_per_sec: u64,
}

pub fn cmd_bench(
    rules: &str,
    url: &str,
    content: &str,
    resource: &[String],
    config: Option<&str>,
    iterations: usize,
) -> Result<(), String> {
    if iterations == 0 {
        return Err("--iterations must be at least 1".to_string());
    }
    let ruleset = input::load_ruleset(rules)?;
    let config = input::load_config(config, false)?;
    let fetcher = LayeredFetcher::from_pairs(resource)?;
    let req_file = input::RequestFile::default();
    let request = input::build_request(url, &req_file)?;
    let response = input::load_response(Some(content), &request, &req_file, &fetcher)?;

    let cache = ThemeCache::new(Duration::from_secs(config.theme_cache_ttl_secs));
    let ctx = ApplyContext::new(&config, &fetcher).with_cache(&cache);

    for _ in 0..WARMUP_ITERATIONS {
        let mut log = ThemeLog::new();
        ruleset.apply_rules(&request, response.clone(), &ctx, &mut log);
    }

    let mut samples_us = Vec::with_capacity(iterations);
    let start = Instant::now();
    for _ in 0..iterations {
        let mut log = ThemeLog::new();
        let t = Instant::now();
        let themed = ruleset.apply_rules(&request, response.clone(), &ctx, &mut log);
        samples_us.push(t.elapsed().as_secs_f64() * 1_000_000.0);
        std::hint::black_box(themed);
    }
    let total_ms = start.elapsed().as_secs_f64() * 1000.0;

    let result = summarize(samples_us, total_ms);
    println!("Theming {} ({} iterations, cache ttl {}s)", url, result.iterations, config.theme_cache_ttl_secs);
    println!(
        "  avg {:.1}us  p50 {:.1}us  p95 {:.1}us  p99 {:.1}us  total {:.1}ms  {} ops/s",
        result.avg_us, result.p50_us, result.p95_us, result.p99_us, result.total_ms, result.ops_per_sec,
    );
    Ok(())
}

fn summarize(mut samples_us: Vec<f64>, total_ms: f64) -> BenchResult {
    samples_us.sort_by(|a, b| a.total_cmp(b));
    let iterations = samples_us.len();
    let avg_us = if iterations > 0 {
        samples_us.iter().sum::<f64>() / iterations as f64
    } else {
        0.0
    };
    BenchResult {
        iterations,
        total_ms,
        avg_us,
        p50_us: percentile(&samples_us, 0.50),
        p95_us: percentile(&samples_us, 0.95),
        p99_us: percentile(&samples_us, 0.99),
        ops_per_sec: if total_ms > 0.0 { (iterations as f64 / (total_ms / 1000.0)) as u64 } else { 0 },
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}
