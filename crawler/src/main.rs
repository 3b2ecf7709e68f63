use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use reqwest::{header, Client};
use scraper::{Html, Selector};
use search_core::persist::{encode_doc_index, write_atomic};
use search_core::DocId;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_subscriber::{fmt, EnvFilter};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "crawler")]
#[command(about = "Download a numbered series of pages into a text corpus")]
struct Cli {
    /// Page url with `{n}` standing for the zero padded page number
    #[arg(long, default_value = "http://scpfoundation.net/scp-{n}")]
    url_template: String,
    /// First page number
    #[arg(long, default_value_t = 2)]
    start: u32,
    /// Number of pages to request
    #[arg(long, default_value_t = 100)]
    count: u32,
    /// Width the page number is zero padded to
    #[arg(long, default_value_t = 3)]
    pad: usize,
    /// Corpus directory, one `{id}.txt` per downloaded page
    #[arg(long, default_value = "result")]
    output: PathBuf,
    /// Document index file with `id: url` lines
    #[arg(long, default_value = "index.txt")]
    index: PathBuf,
    /// Requests in flight at once
    #[arg(long, default_value_t = 8)]
    concurrency: usize,
    /// Request timeout seconds
    #[arg(long, default_value_t = 12)]
    timeout_secs: u64,
    #[arg(long, default_value = "search-core-crawler/0.1")]
    user_agent: String,
    /// Store the page markup as served instead of the extracted body text
    #[arg(long, default_value_t = false)]
    keep_html: bool,
}

/// Upper bound on a single page body.
const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Cli::parse();

    let urls = page_urls(&args.url_template, args.start, args.count, args.pad)?;
    let client = Client::builder()
        .user_agent(args.user_agent.clone())
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(Duration::from_secs(args.timeout_secs))
        .build()?;
    let body_sel = Selector::parse("body").map_err(|e| anyhow!("bad selector: {e:?}"))?;
    tracing::info!(
        pages = urls.len(),
        concurrency = args.concurrency,
        output = %args.output.display(),
        "crawl started"
    );

    let mut pending: VecDeque<(usize, Url)> = urls.into_iter().enumerate().collect();
    let mut inflight: VecDeque<(usize, Url, JoinHandle<Result<String>>)> = VecDeque::new();
    let mut pages: BTreeMap<usize, (Url, String)> = BTreeMap::new();

    while !pending.is_empty() || !inflight.is_empty() {
        while inflight.len() < args.concurrency.max(1) {
            let Some((n, url)) = pending.pop_front() else { break };
            let client_c = client.clone();
            let sel = body_sel.clone();
            let keep_html = args.keep_html;
            let target = url.clone();
            let handle = tokio::spawn(async move {
                let html = fetch(&client_c, target).await?;
                Ok::<_, anyhow::Error>(if keep_html { html } else { extract_text(&html, &sel) })
            });
            inflight.push_back((n, url, handle));
        }

        let Some((n, url, handle)) = inflight.pop_front() else { break };
        match handle.await {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                tracing::info!(%url, chars = text.chars().count(), "fetched");
                pages.insert(n, (url, text));
            }
            Ok(Ok(_)) => tracing::warn!(%url, "page has no text, skipping"),
            Ok(Err(e)) => tracing::warn!(%url, error = %e, "fetch failed, skipping"),
            Err(e) => tracing::warn!(%url, error = %e, "fetch task failed, skipping"),
        }
    }

    let saved = write_corpus(&args.output, &args.index, pages.into_values())?;
    tracing::info!(saved, index = %args.index.display(), "crawl complete");
    Ok(())
}

/// Urls of pages `start .. start + count`, numbers zero padded to `pad`.
fn page_urls(template: &str, start: u32, count: u32, pad: usize) -> Result<Vec<Url>> {
    if !template.contains("{n}") {
        bail!("url template {template:?} has no {{n}} placeholder");
    }
    (start..start.saturating_add(count))
        .map(|i| {
            let raw = template.replace("{n}", &format!("{i:0pad$}"));
            Url::parse(&raw).with_context(|| format!("invalid page url {raw:?}"))
        })
        .collect()
}

async fn fetch(client: &Client, url: Url) -> Result<String> {
    let resp = client.get(url).send().await?;
    if !resp.status().is_success() {
        bail!("status {}", resp.status());
    }
    if let Some(ct) = resp.headers().get(header::CONTENT_TYPE) {
        if let Ok(v) = ct.to_str() {
            if !v.starts_with("text/") {
                bail!("unexpected content type {v}");
            }
        }
    }
    let bytes = resp.bytes().await?;
    if bytes.len() > MAX_PAGE_BYTES {
        bail!("page is {} bytes", bytes.len());
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Visible body text, one line per text node run, blank lines dropped.
fn extract_text(html: &str, body: &Selector) -> String {
    let doc = Html::parse_document(html);
    let Some(node) = doc.select(body).next() else {
        return String::new();
    };
    node.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the corpus: stale `{id}.txt` files are removed, pages get ids
/// from 0 in the order given and the document index is rewritten.
fn write_corpus(
    dir: &Path,
    index: &Path,
    pages: impl IntoIterator<Item = (Url, String)>,
) -> Result<usize> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let stem = path.file_stem().and_then(|s| s.to_str());
        let numbered = path.extension().and_then(|e| e.to_str()) == Some("txt")
            && stem.is_some_and(|s| s.parse::<DocId>().is_ok());
        if numbered && path.is_file() {
            fs::remove_file(&path)?;
        }
    }

    let mut urls: BTreeMap<DocId, String> = BTreeMap::new();
    for (id, (url, text)) in pages.into_iter().enumerate() {
        let id = id as DocId;
        write_atomic(&dir.join(format!("{id}.txt")), &text)?;
        urls.insert(id, url.to_string());
    }
    write_atomic(index, &encode_doc_index(&urls))?;
    Ok(urls.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_urls_are_zero_padded() {
        let urls = page_urls("http://scp.example/scp-{n}", 2, 3, 3).unwrap();
        let urls: Vec<String> = urls.iter().map(Url::to_string).collect();
        let expected = [
            "http://scp.example/scp-002",
            "http://scp.example/scp-003",
            "http://scp.example/scp-004",
        ];
        assert_eq!(urls, expected);
        let wide = page_urls("http://scp.example/scp-{n}", 1000, 1, 3).unwrap();
        assert_eq!(wide[0].path(), "/scp-1000");
    }

    #[test]
    fn template_needs_a_placeholder() {
        assert!(page_urls("http://scp.example/scp", 0, 1, 3).is_err());
        assert!(page_urls("not a url {n}", 0, 1, 3).is_err());
    }

    #[test]
    fn body_text_skips_markup_and_head() {
        let sel = Selector::parse("body").unwrap();
        let html = "<html><head><title>SCP-002</title></head>\
                    <body><h1>Объект</h1>\n<p>Класс: <b>Евклид</b></p></body></html>";
        assert_eq!(extract_text(html, &sel), "Объект\nКласс:\nЕвклид");
    }

    #[test]
    fn corpus_is_replaced_with_sequential_ids() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = dir.path().join("result");
        let index = dir.path().join("index.txt");
        fs::create_dir_all(&corpus).unwrap();
        fs::write(corpus.join("7.txt"), "stale").unwrap();
        fs::write(corpus.join("notes.txt"), "kept").unwrap();

        let pages = vec![
            (Url::parse("http://scp.example/scp-002").unwrap(), "кот".to_string()),
            (Url::parse("http://scp.example/scp-004").unwrap(), "собака".to_string()),
        ];
        assert_eq!(write_corpus(&corpus, &index, pages).unwrap(), 2);

        assert_eq!(fs::read_to_string(corpus.join("1.txt")).unwrap(), "собака");
        assert!(!corpus.join("7.txt").exists());
        assert!(corpus.join("notes.txt").exists());
        assert_eq!(
            fs::read_to_string(&index).unwrap(),
            "0: http://scp.example/scp-002\n1: http://scp.example/scp-004\n"
        );
    }
}
