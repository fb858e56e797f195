//! avatar-cli: operator frontend for the avatar transcript review queue
//!
//! Talks to the avatar-server HTTP API. Every review call first fetches an
//! `avatar_review` nonce from `GET /nonce`.
//!
//! # Subcommands
//! - `status`                                  : server health
//! - `list [--status S] [--json]`              : review queue
//! - `unparsed`                                : transcripts awaiting extraction
//! - `show <session>`                          : transcript + extracted fields
//! - `parse <session>`                         : run extraction
//! - `edit <session> [--year] [--make] [--model] [--vin]`: manual correction
//! - `forward <session>`                       : one-shot send to Supabase

use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8766";
const REVIEW_ACTION: &str = "avatar_review";
const NONCE_HEADER: &str = "X-Avatar-Nonce";
const NOT_CAPTURED: &str = "Not captured";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "avatar-cli", version, about = "Review avatar transcripts and forward vehicle leads")]
struct Cli {
    /// Avatar HTTP server URL (overrides AVATAR_HTTP_URL env var)
    #[arg(long, env = "AVATAR_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show avatar server status
    Status,

    /// List reviews, newest first
    List {
        /// Only reviews in this state (pending, sent, error)
        #[arg(long)]
        status: Option<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List transcripts that have not been parsed yet
    Unparsed,

    /// Show a transcript and its extracted vehicle fields
    Show { session_id: String },

    /// Extract vehicle fields from a stored transcript
    Parse { session_id: String },

    /// Correct extracted fields; omitted flags keep their current value
    Edit {
        session_id: String,
        #[arg(long)]
        year: Option<String>,
        #[arg(long)]
        make: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        vin: Option<String>,
    },

    /// Send a pending review to Supabase (never retried)
    Forward { session_id: String },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VehicleView {
    pub year: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub vin: Option<String>,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewView {
    pub session_id: String,
    pub vehicle: VehicleView,
    pub review_status: String,
    pub supabase_id: Option<String>,
    pub last_error: Option<String>,
    pub page_url: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewList {
    pub count: usize,
    pub reviews: Vec<ReviewView>,
}

#[derive(Debug, Deserialize)]
pub struct MessageView {
    pub speaker: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptView {
    pub session_id: String,
    pub messages: Vec<MessageView>,
    pub parsed: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptList {
    pub count: usize,
    pub transcripts: Vec<TranscriptView>,
}

// ============================================================================
// Rendering
// ============================================================================

pub fn display(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.is_empty() => v,
        _ => NOT_CAPTURED,
    }
}

/// One line per review for `list`.
pub fn format_review_line(r: &ReviewView) -> String {
    format!(
        "{:<8} {}  {} {} {}  VIN {}",
        r.review_status,
        r.session_id,
        display(r.vehicle.year.as_deref()),
        display(r.vehicle.make.as_deref()),
        display(r.vehicle.model.as_deref()),
        display(r.vehicle.vin.as_deref()),
    )
}

pub fn format_review_detail(r: &ReviewView) -> String {
    let mut out = format!(
        "Status:  {}\nYear:    {}\nMake:    {}\nModel:   {}\nVIN:     {}\nSource:  {}\nPage:    {}",
        r.review_status,
        display(r.vehicle.year.as_deref()),
        display(r.vehicle.make.as_deref()),
        display(r.vehicle.model.as_deref()),
        display(r.vehicle.vin.as_deref()),
        r.vehicle.label,
        display(r.page_url.as_deref()),
    );
    if let Some(id) = &r.supabase_id {
        out.push_str(&format!("\nSupabase id: {}", id));
    }
    if let Some(err) = &r.last_error {
        out.push_str(&format!("\nLast error:  {}", err));
    }
    out
}

/// Body for `PUT /reviews/{id}`: flags override, everything else is kept.
pub fn edit_body(
    current: &VehicleView,
    year: Option<String>,
    make: Option<String>,
    model: Option<String>,
    vin: Option<String>,
) -> Value {
    serde_json::json!({
        "year": year.or_else(|| current.year.clone()),
        "make": make.or_else(|| current.make.clone()),
        "model": model.or_else(|| current.model.clone()),
        "vin": vin.or_else(|| current.vin.clone()),
    })
}

// ============================================================================
// HTTP Client
// ============================================================================

/// Append percent-encoded path segments and query pairs to the server URL.
/// Session ids are opaque, so they never go through `format!`.
pub fn endpoint(base: &Url, segments: &[&str], query: &[(&str, &str)]) -> anyhow::Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("server URL cannot take a path: {}", base))?
        .pop_if_empty()
        .extend(segments);
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

struct Api {
    server: Url,
    client: reqwest::blocking::Client,
}

impl Api {
    fn new(server: &str) -> anyhow::Result<Self> {
        let server = Url::parse(server).with_context(|| format!("invalid server URL {}", server))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { server, client })
    }

    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> anyhow::Result<Url> {
        endpoint(&self.server, segments, query)
    }

    fn nonce(&self) -> anyhow::Result<String> {
        let url = self.url(&["nonce"], &[("action", REVIEW_ACTION)])?;
        let body: Value = self
            .client
            .get(url.clone())
            .send()
            .with_context(|| format!("connection failed to {}", url))?
            .json()?;
        body["nonce"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("server did not issue a nonce"))
    }

    /// Send a nonce-guarded request and decode the JSON body.
    fn call(
        &self,
        method: reqwest::Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> anyhow::Result<Value> {
        let nonce = self.nonce()?;
        let url = self.url(segments, query)?;
        let mut req = self
            .client
            .request(method, url.clone())
            .header(NONCE_HEADER, nonce);
        if let Some(b) = body {
            req = req.json(b);
        }

        let resp = req.send().with_context(|| format!("connection failed to {}", url))?;
        let status = resp.status();
        let body: Value = resp.json().unwrap_or_default();
        if !status.is_success() {
            let msg = body["error"].as_str().unwrap_or("no error message");
            bail!("server returned {}: {}", status, msg);
        }
        Ok(body)
    }

    fn list(&self, status: Option<&str>) -> anyhow::Result<Value> {
        let query: Vec<(&str, &str)> = status.map(|s| ("status", s)).into_iter().collect();
        self.call(reqwest::Method::GET, &["reviews"], &query, None)
    }

    fn review(&self, session_id: &str) -> anyhow::Result<Option<ReviewView>> {
        let list: ReviewList = serde_json::from_value(self.list(None)?)?;
        Ok(list.reviews.into_iter().find(|r| r.session_id == session_id))
    }
}

// ============================================================================
// Commands
// ============================================================================

fn do_status(api: &Api) -> anyhow::Result<()> {
    let url = api.url(&["health"], &[])?;
    let resp = api
        .client
        .get(url.clone())
        .send()
        .with_context(|| format!("cannot reach {}", url))?;
    if !resp.status().is_success() {
        bail!("server unhealthy (HTTP {})", resp.status());
    }

    let body: Value = resp.json().unwrap_or_default();
    println!("Avatar server:  {}", body["status"].as_str().unwrap_or("unknown"));
    println!("Version:        {}", body["version"].as_str().unwrap_or("?"));
    println!("Store:          {}", body["store"].as_str().unwrap_or("?"));
    println!("Forwarding:     {}", body["forwarding"].as_bool().unwrap_or(false));
    println!("Session tokens: {}", body["session_tokens"].as_bool().unwrap_or(false));
    Ok(())
}

fn do_list(api: &Api, status: Option<&str>, json: bool) -> anyhow::Result<()> {
    let body = api.list(status)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    let list: ReviewList = serde_json::from_value(body)?;
    if list.count == 0 {
        eprintln!("No reviews");
        return Ok(());
    }
    for r in &list.reviews {
        println!("{}", format_review_line(r));
    }
    Ok(())
}

fn do_unparsed(api: &Api) -> anyhow::Result<()> {
    let list: TranscriptList =
        serde_json::from_value(api.call(reqwest::Method::GET, &["transcripts"], &[], None)?)?;
    if list.count == 0 {
        eprintln!("Every transcript has been parsed");
        return Ok(());
    }
    for t in &list.transcripts {
        println!(
            "{}  {} messages  {}",
            t.session_id,
            t.messages.len(),
            t.created_at.as_deref().unwrap_or("?")
        );
    }
    Ok(())
}

fn do_show(api: &Api, session_id: &str) -> anyhow::Result<()> {
    let transcript: TranscriptView = serde_json::from_value(api.call(
        reqwest::Method::GET,
        &["transcripts", session_id],
        &[],
        None,
    )?)?;

    println!("Session: {}", transcript.session_id);
    if let Some(at) = &transcript.created_at {
        println!("Saved:   {}", at);
    }
    println!("Parsed:  {}\n", transcript.parsed);
    for m in &transcript.messages {
        println!("[{}] {}", m.speaker, m.text);
    }

    match api.review(session_id)? {
        Some(r) => println!("\n{}", format_review_detail(&r)),
        None => println!("\nNot parsed yet; run `avatar-cli parse {}`", session_id),
    }
    Ok(())
}

fn do_parse(api: &Api, session_id: &str) -> anyhow::Result<()> {
    let body = api.call(
        reqwest::Method::POST,
        &["reviews", session_id, "parse"],
        &[],
        None,
    )?;
    let review: ReviewView = serde_json::from_value(body)?;
    println!("{}", format_review_detail(&review));
    Ok(())
}

fn do_edit(
    api: &Api,
    session_id: &str,
    year: Option<String>,
    make: Option<String>,
    model: Option<String>,
    vin: Option<String>,
) -> anyhow::Result<()> {
    let current = api
        .review(session_id)?
        .ok_or_else(|| anyhow!("no review for session {}; parse it first", session_id))?;
    let body = edit_body(&current.vehicle, year, make, model, vin);

    let updated = api.call(
        reqwest::Method::PUT,
        &["reviews", session_id],
        &[],
        Some(&body),
    )?;
    let review: ReviewView = serde_json::from_value(updated)?;
    println!("{}", format_review_detail(&review));
    Ok(())
}

fn do_forward(api: &Api, session_id: &str) -> anyhow::Result<()> {
    let body = api.call(
        reqwest::Method::POST,
        &["reviews", session_id, "forward"],
        &[],
        None,
    )?;
    let review: ReviewView = serde_json::from_value(body)?;
    println!(
        "Forwarded {} (Supabase id {})",
        review.session_id,
        display(review.supabase_id.as_deref())
    );
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();

    let result = Api::new(&cli.server).and_then(|api| match cli.command {
        Commands::Status => do_status(&api),
        Commands::List { status, json } => do_list(&api, status.as_deref(), json),
        Commands::Unparsed => do_unparsed(&api),
        Commands::Show { session_id } => do_show(&api, &session_id),
        Commands::Parse { session_id } => do_parse(&api, &session_id),
        Commands::Edit {
            session_id,
            year,
            make,
            model,
            vin,
        } => do_edit(&api, &session_id, year, make, model, vin),
        Commands::Forward { session_id } => do_forward(&api, &session_id),
    });

    if let Err(e) = result {
        eprintln!("avatar-cli: {:#}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_session_ids() {
        let base = Url::parse("http://127.0.0.1:8766").unwrap();
        let url = endpoint(&base, &["reviews", "a/b?c#d", "forward"], &[]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8766/reviews/a%2Fb%3Fc%23d/forward");

        let url = endpoint(&base, &["reviews"], &[("status", "pending&x=1")]).unwrap();
        assert_eq!(url.path(), "/reviews");
        assert_eq!(url.query(), Some("status=pending%26x%3D1"));
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let base = Url::parse("https://ops.example/avatar/").unwrap();
        let url = endpoint(&base, &["nonce"], &[("action", "avatar_review")]).unwrap();
        assert_eq!(url.as_str(), "https://ops.example/avatar/nonce?action=avatar_review");
    }

    fn review(value: Value) -> ReviewView {
        serde_json::from_value(value).unwrap()
    }

    fn sample() -> ReviewView {
        review(serde_json::json!({
            "id": "0b6f2c1e-0000-4000-8000-000000000000",
            "session_id": "sess-9",
            "vehicle": {"year": "2021", "make": "Honda", "model": null, "vin": null, "label": "regex_extracted"},
            "review_status": "pending",
            "supabase_id": null,
            "last_error": null,
            "page_url": null,
            "created_at": "2026-03-01T10:00:00Z",
            "updated_at": "2026-03-01T10:00:00Z",
            "sent_at": null
        }))
    }

    #[test]
    fn test_display_absent_fields() {
        assert_eq!(display(None), "Not captured");
        assert_eq!(display(Some("")), "Not captured");
        assert_eq!(display(Some("Civic")), "Civic");
    }

    #[test]
    fn test_review_line_marks_missing_fields() {
        let line = format_review_line(&sample());
        assert!(line.starts_with("pending"));
        assert!(line.contains("sess-9"));
        assert!(line.contains("2021 Honda Not captured"));
        assert!(line.ends_with("VIN Not captured"));
    }

    #[test]
    fn test_review_detail_shows_error() {
        let mut r = sample();
        r.last_error = Some("API error (500): boom".to_string());
        let detail = format_review_detail(&r);
        assert!(detail.contains("Model:   Not captured"));
        assert!(detail.contains("Source:  regex_extracted"));
        assert!(detail.contains("Last error:  API error (500): boom"));
        assert!(!detail.contains("Supabase id"));
    }

    #[test]
    fn test_edit_body_keeps_unspecified_fields() {
        let current = sample().vehicle;
        let body = edit_body(&current, None, None, Some("Accord".into()), None);
        assert_eq!(body["year"], "2021");
        assert_eq!(body["make"], "Honda");
        assert_eq!(body["model"], "Accord");
        assert!(body["vin"].is_null());
    }

    #[test]
    fn test_review_list_parses_server_shape() {
        let list: ReviewList = serde_json::from_value(serde_json::json!({
            "count": 1,
            "reviews": [{
                "session_id": "a",
                "vehicle": {"year": null, "make": null, "model": null, "vin": null, "label": "no_data_found"},
                "review_status": "sent",
                "supabase_id": "77",
                "last_error": null,
                "page_url": "https://dealer.example",
                "updated_at": "2026-03-01T10:00:00Z"
            }]
        }))
        .unwrap();
        assert_eq!(list.count, 1);
        assert_eq!(list.reviews[0].supabase_id.as_deref(), Some("77"));
    }

    #[test]
    fn test_api_trims_trailing_slash() {
        let api = Api::new("http://localhost:8766/").unwrap();
        assert_eq!(api.url("/health"), "http://localhost:8766/health");
    }
}
