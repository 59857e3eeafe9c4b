//! ai-exec-probe: 手动验证执行核心（缓存、去重、重试、流式）的命令行工具
//!
//! Usage:
//!   ai-exec-probe <url> [--body <json>] [--config <yaml>] [--bearer <token>]
//!                       [--repeat <n>] [--stream]
//!
//! Set `RUST_LOG=ai_lib_exec=debug` to watch cache hits and joins.

use ai_lib_exec::{ExecutionClient, ExecutionClientBuilder, ExecutionConfig, OutboundRequest};
use anyhow::{anyhow, bail, Context};
use serde_json::Value;
use std::io::Write;
use tracing_subscriber::EnvFilter;

struct Args {
    url: String,
    body: Value,
    config: Option<String>,
    bearer: Option<String>,
    repeat: usize,
    stream: bool,
}

fn print_usage() {
    println!(
        r#"ai-exec-probe: request execution probe

USAGE:
    ai-exec-probe <URL> [OPTIONS]

OPTIONS:
    --body <json>       Request body (default: {{}})
    --config <yaml>     Execution config file
    --bearer <token>    Authorization bearer token
    --repeat <n>        Concurrent identical calls (default: 1)
    --stream            Stream the response as SSE events

ENVIRONMENT:
    AI_EXEC_*           Execution config overrides
    RUST_LOG            Log filter"#
    );
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut url = None;
    let mut body = Value::Object(Default::default());
    let mut config = None;
    let mut bearer = None;
    let mut repeat = 1usize;
    let mut stream = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{} needs a value", flag))
        };
        match arg.as_str() {
            "--body" => {
                body = serde_json::from_str(&value("--body")?).context("--body is not JSON")?
            }
            "--config" => config = Some(value("--config")?),
            "--bearer" => bearer = Some(value("--bearer")?),
            "--repeat" => {
                repeat = value("--repeat")?
                    .parse()
                    .context("--repeat must be a number")?
            }
            "--stream" => stream = true,
            other if other.starts_with("--") => bail!("unknown option: {}", other),
            other => url = Some(other.to_string()),
        }
    }

    Ok(Args {
        url: url.ok_or_else(|| anyhow!("missing <URL>"))?,
        body,
        config,
        bearer,
        repeat: repeat.max(1),
        stream,
    })
}

fn build_client(config: Option<&str>) -> anyhow::Result<ExecutionClient> {
    let cfg = match config {
        Some(path) => ExecutionConfig::from_yaml_file(path)?,
        None => ExecutionConfig::default(),
    }
    .apply_env()?;
    // Run on the probe's own runtime.
    Ok(ExecutionClientBuilder::from_config(&cfg)?
        .with_handle(tokio::runtime::Handle::current())
        .build()?)
}

async fn run_calls(client: &ExecutionClient, request: &OutboundRequest, repeat: usize) {
    let calls = (0..repeat).map(|_| client.execute_async(request));
    for (i, outcome) in futures::future::join_all(calls).await.into_iter().enumerate() {
        match outcome {
            Ok(resp) => println!(
                "#{} status={} cached={} elapsed_ms={} bytes={}",
                i,
                resp.status,
                resp.cached,
                resp.elapsed.as_millis(),
                resp.body.len()
            ),
            Err(e) => println!("#{} error kind={} {}", i, e.kind(), e),
        }
    }
}

async fn run_stream(client: &ExecutionClient, request: &OutboundRequest) -> anyhow::Result<()> {
    let mut failure = None;
    let mut stdout = std::io::stdout();
    client
        .execute_stream(
            request,
            |data| {
                let _ = writeln!(stdout, "{}", data);
            },
            || println!("-- complete"),
            |e| failure = Some(e),
        )
        .await;
    match failure {
        Some(e) => Err(anyhow!("stream failed ({}): {}", e.kind(), e)),
        None => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let raw: Vec<String> = std::env::args().skip(1).collect();
    if raw.is_empty() || raw.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }
    let args = parse_args(&raw)?;

    let client = build_client(args.config.as_deref())?;
    let mut request = OutboundRequest::post(&args.url, args.body)?;
    if let Some(token) = &args.bearer {
        request = request.with_bearer(token);
    }

    if args.stream {
        run_stream(&client, &request).await?;
    } else {
        run_calls(&client, &request, args.repeat).await;
        println!("{}", serde_json::to_string_pretty(&client.signals())?);
    }
    client.shutdown();
    Ok(())
}
