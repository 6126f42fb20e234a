//! Command-line client for a running `pdfqa` server.
//!
//! Uploads are checked locally before anything is sent: size, file name, and the `%PDF-`
//! signature. Responses are printed as pretty JSON.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use pdfqa::config::DEFAULT_MAX_UPLOAD_BYTES;
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

const PDF_SIGNATURE: &[u8] = b"%PDF-";
const SUSPICIOUS_CHARACTERS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Parser)]
#[command(
    name = "pdfqa-client",
    about = "Upload PDFs to a pdfqa server and ask questions about them"
)]
struct Cli {
    /// Base URL of the server.
    #[arg(long, default_value = "http://localhost:8000", env = "PDFQA_SERVER")]
    server: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate and upload a PDF, printing its file hash.
    Upload {
        path: PathBuf,
        /// Largest file accepted before sending.
        #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
        max_bytes: usize,
    },
    /// Ask a question about a previously uploaded PDF.
    Ask {
        #[arg(long)]
        file_hash: String,
        question: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let http = reqwest::Client::builder()
        .user_agent("pdfqa-client")
        .build()
        .context("failed to build HTTP client")?;
    let base = cli.server.trim_end_matches('/');

    let response = match cli.command {
        Command::Upload { path, max_bytes } => upload(&http, base, &path, max_bytes).await?,
        Command::Ask {
            file_hash,
            question,
        } => ask(&http, base, &file_hash, &question).await?,
    };

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn upload(http: &reqwest::Client, base: &str, path: &Path, max_bytes: usize) -> Result<Value> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))?
        .to_string();
    validate_filename(&filename)?;

    let contents = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    validate_contents(&contents, max_bytes)?;

    let part = Part::bytes(contents)
        .file_name(filename)
        .mime_str("application/pdf")?;
    let form = Form::new().part("file", part);

    let response = http
        .post(format!("{base}/api/upload-pdf"))
        .multipart(form)
        .send()
        .await
        .with_context(|| format!("failed to reach {base}"))?;
    read_json(response).await
}

async fn ask(http: &reqwest::Client, base: &str, file_hash: &str, question: &str) -> Result<Value> {
    if question.trim().is_empty() {
        bail!("question cannot be empty");
    }
    let response = http
        .post(format!("{base}/api/ask-question"))
        .json(&json!({ "question": question, "file_hash": file_hash }))
        .send()
        .await
        .with_context(|| format!("failed to reach {base}"))?;
    read_json(response).await
}

async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body: Value = response
        .json()
        .await
        .with_context(|| format!("server returned {status} with a non-JSON body"))?;
    if !status.is_success() {
        let detail = body
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or("no detail provided");
        bail!("server returned {status}: {detail}");
    }
    Ok(body)
}

/// Reject names with characters that are unsafe on common filesystems or with stacked
/// extensions such as `invoice.php.pdf`.
fn validate_filename(filename: &str) -> Result<()> {
    if !filename.to_ascii_lowercase().ends_with(".pdf") {
        bail!("{filename} is not a PDF file");
    }
    if filename
        .chars()
        .any(|c| SUSPICIOUS_CHARACTERS.contains(&c) || c.is_control())
    {
        bail!("{filename} contains characters that are not allowed in file names");
    }
    if filename.split('.').count() > 2 {
        bail!("{filename} has more than one extension");
    }
    Ok(())
}

fn validate_contents(contents: &[u8], max_bytes: usize) -> Result<()> {
    if contents.len() > max_bytes {
        bail!(
            "file is {} bytes; the limit is {max_bytes} bytes",
            contents.len()
        );
    }
    if !contents.starts_with(PDF_SIGNATURE) {
        bail!("file does not start with the PDF signature");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_pdf_names() {
        assert!(validate_filename("report.pdf").is_ok());
        assert!(validate_filename("Quarterly Report.PDF").is_ok());
    }

    #[test]
    fn rejects_suspicious_names() {
        for name in ["invoice.php.pdf", "a<b.pdf", "what?.pdf", "tab\t.pdf", "notes.txt"] {
            assert!(validate_filename(name).is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn contents_must_fit_and_carry_signature() {
        assert!(validate_contents(b"%PDF-1.7\n", 64).is_ok());
        assert!(validate_contents(b"%PDF-1.7\n", 4).is_err());
        assert!(validate_contents(b"PK\x03\x04zip", 64).is_err());
        assert!(validate_contents(b"", 64).is_err());
    }
}
