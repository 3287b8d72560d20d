//! Dovetail CLI
//!
//! Theme pages from the command line and check rulesets.

mod bench;
mod fetcher;
mod input;
mod logger;

use std::fs;
use std::time::Duration;

use clap::{Parser, Subcommand};

use dt_core::{ApplyContext, Level, ThemeCache, ThemeLog};

use fetcher::LayeredFetcher;

#[derive(Parser)]
#[command(name = "dovetail")]
#[command(about = "Merge HTML content into a theme using an XML ruleset")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Theme one page and write the result
    Render {
        /// Ruleset XML file
        #[arg(short, long)]
        rules: String,

        /// URL of the page being themed
        #[arg(short, long)]
        url: String,

        /// Content HTML file (fetched from the URL when omitted)
        #[arg(short, long)]
        content: Option<String>,

        /// JSON file with request headers, environ and response headers
        #[arg(long)]
        request: Option<String>,

        /// Serve URL from a local file (URL=PATH), may be repeated
        #[arg(long)]
        resource: Vec<String>,

        /// JSON configuration file
        #[arg(long)]
        config: Option<String>,

        /// Bracket every edit with marker comments
        #[arg(long)]
        debug: bool,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Write the request log as JSON
        #[arg(long)]
        log_json: Option<String>,
    },

    /// Print the page classes a request gets
    Classify {
        #[arg(short, long)]
        rules: String,

        #[arg(short, long)]
        url: String,

        #[arg(long)]
        request: Option<String>,

        #[arg(short, long)]
        content: Option<String>,

        #[arg(long)]
        resource: Vec<String>,

        #[arg(long)]
        config: Option<String>,
    },

    /// Parse and lint a ruleset
    Check {
        #[arg(short, long)]
        rules: String,
    },

    /// Time repeated theming of one page
    Bench {
        #[arg(short, long)]
        rules: String,

        #[arg(short, long)]
        url: String,

        #[arg(short, long)]
        content: String,

        #[arg(long)]
        resource: Vec<String>,

        #[arg(long)]
        config: Option<String>,

        /// Number of timed iterations
        #[arg(short, long, default_value = "1000")]
        iterations: usize,
    },
}

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let result = match cli.command {
        Commands::Render {
            rules,
            url,
            content,
            request,
            resource,
            config,
            debug,
            output,
            log_json,
        } => cmd_render(&RenderArgs {
            rules,
            url,
            content,
            request,
            resource,
            config,
            debug,
            output,
            log_json,
        }),
        Commands::Classify {
            rules,
            url,
            request,
            content,
            resource,
            config,
        } => cmd_classify(
            &rules,
            &url,
            request.as_deref(),
            content.as_deref(),
            &resource,
            config.as_deref(),
        ),
        Commands::Check { rules } => cmd_check(&rules),
        Commands::Bench {
            rules,
            url,
            content,
            resource,
            config,
            iterations,
        } => bench::cmd_bench(&rules, &url, &content, &resource, config.as_deref(), iterations),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

struct RenderArgs {
    rules: String,
    url: String,
    content: Option<String>,
    request: Option<String>,
    resource: Vec<String>,
    config: Option<String>,
    debug: bool,
    output: Option<String>,
    log_json: Option<String>,
}

fn cmd_render(args: &RenderArgs) -> Result<(), String> {
    let ruleset = input::load_ruleset(&args.rules)?;
    let config = input::load_config(args.config.as_deref(), args.debug)?;
    let fetcher = LayeredFetcher::from_pairs(&args.resource)?;
    let req_file = input::load_request_file(args.request.as_deref())?;
    let request = input::build_request(&args.url, &req_file)?;
    let response = input::load_response(args.content.as_deref(), &request, &req_file, &fetcher)?;

    let cache = ThemeCache::new(Duration::from_secs(config.theme_cache_ttl_secs));
    let ctx = ApplyContext::new(&config, &fetcher).with_cache(&cache);
    let mut log = ThemeLog::new();
    let original = response.body.clone();
    let themed = ruleset.apply_rules(&request, response, &ctx, &mut log);

    if themed.body == original {
        log::info!("page was returned unthemed");
    } else if let Some(theme) = log.theme_url() {
        log::info!("themed with {theme}");
    }
    for entry in log.at_least(Level::Warn) {
        eprintln!("{:?}: {} ({})", entry.level, entry.message, entry.source);
    }

    match &args.output {
        Some(path) => fs::write(path, &themed.body).map_err(|e| format!("Failed to write '{}': {}", path, e))?,
        None => {
            use std::io::Write;
            std::io::stdout()
                .write_all(&themed.body)
                .map_err(|e| format!("Failed to write output: {}", e))?;
        }
    }

    if let Some(path) = &args.log_json {
        let json = serde_json::to_string_pretty(&log).map_err(|e| format!("Failed to encode log: {}", e))?;
        fs::write(path, json).map_err(|e| format!("Failed to write '{}': {}", path, e))?;
    }
    Ok(())
}

fn cmd_classify(
    rules: &str,
    url: &str,
    request: Option<&str>,
    content: Option<&str>,
    resource: &[String],
    config: Option<&str>,
) -> Result<(), String> {
    let ruleset = input::load_ruleset(rules)?;
    let config = input::load_config(config, false)?;
    let fetcher = LayeredFetcher::from_pairs(resource)?;
    let req_file = input::load_request_file(request)?;
    let request = input::build_request(url, &req_file)?;
    // Response-header matches need a response; an empty page stands in when
    // no content is given.
    let response = match content {
        Some(_) => input::load_response(content, &request, &req_file, &fetcher)?,
        None => {
            let mut response = dt_core::Response::html(Vec::new());
            for (name, value) in &req_file.response_headers {
                response.headers.insert(name.as_str(), value.as_str());
            }
            response
        }
    };

    let ctx = ApplyContext::new(&config, &fetcher);
    let mut log = ThemeLog::new();
    match ruleset.classify(&request, &response, &ctx, &mut log) {
        Ok(classes) => {
            let json = serde_json::to_string(&classes).map_err(|e| format!("Failed to encode classes: {}", e))?;
            println!("{json}");
        }
        Err(abort) => {
            log::info!("{}", abort.reason);
            println!("abort");
        }
    }
    Ok(())
}

fn cmd_check(rules: &str) -> Result<(), String> {
    let mut ruleset = input::load_ruleset(rules)?;
    let report = dt_compiler::lint_ruleset(&mut ruleset);

    println!("Ruleset: {}", rules);
    println!("  Matches: {}", report.matches);
    println!("  Rules: {}", report.rules);
    println!("  Actions: {} ({} duplicates)", report.actions_after, report.deduped);
    match &ruleset.theme {
        Some(theme) => println!("  Theme: {}", theme.href),
        None => println!("  Theme: (none)"),
    }
    if report.warnings.is_empty() {
        println!("OK");
    } else {
        println!("Warnings:");
        for warning in &report.warnings {
            println!("  - {}", warning);
        }
    }
    Ok(())
}
