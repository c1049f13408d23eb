//! Main marketing site.
//!
//! Static sections (hero, pipeline, innovation, live feed, stack, about,
//! footer) rendered as terminal text. The only local state is which pipeline
//! step card is expanded; live data comes from [`crate::feed::demo`] and the
//! operator panel in [`controls`].

pub mod controls;

use std::fmt::Write as _;

use crate::feed::demo::DemoFeed;
use crate::feed::trades::Trade;

pub struct PipelineStep {
    pub id: &'static str,
    pub title: &'static str,
    pub subtitle: &'static str,
    pub desc: &'static str,
    pub tag: &'static str,
}

pub const PIPELINE_STEPS: [PipelineStep; 4] = [
    PipelineStep {
        id: "01",
        title: "RSS News Ingestion",
        subtitle: "30+ Sources",
        desc: "Polls WSJ, Bloomberg, CNBC, BBC, NYT and 25+ feeds every 10 seconds. Deduplicates via seen_links.txt and returns structured DataFrames ready for inference.",
        tag: "rss.py",
    },
    PipelineStep {
        id: "02",
        title: "FinBERT Sentiment",
        subtitle: "GPU Inference",
        desc: "A Modal A10G GPU runs ProsusAI/FinBERT. Entire batches score in a single GPU call, returning a label, confidence score, and directional signal.",
        tag: "modaltest.py",
    },
    PipelineStep {
        id: "03",
        title: "Market Matching",
        subtitle: "Semantic Search",
        desc: "SentenceTransformer embeds all open Kalshi markets. Cosine similarity instantly finds the best matching contract for each headline.",
        tag: "news_runner.py",
    },
    PipelineStep {
        id: "04",
        title: "Order Execution",
        subtitle: "RSA-PSS Auth",
        desc: "Cryptographically signed requests hit Kalshi's trade API. Limit orders are placed only when confidence clears 0.70, protecting against low-signal noise.",
        tag: "kalshi_order_executor.py",
    },
];

pub const HERO_STATS: [(&str, &str); 4] = [
    ("30+", "News Sources"),
    ("10s", "Poll Interval"),
    ("0.70", "Conf. Threshold"),
    ("A10G", "GPU Inference"),
];

pub const TECH: [(&str, &str); 6] = [
    ("FinBERT", "Financial NLP"),
    ("Modal", "GPU Cloud"),
    ("Kalshi API", "Prediction Markets"),
    ("SentenceTransformers", "Semantic Matching"),
    ("GDELT GKG", "Global News Feed"),
    ("RSA-PSS", "Auth Signing"),
];

/// (file, done, description) for the build checklist.
pub const BUILD_FILES: [(&str, bool, &str); 7] = [
    ("News/rss.py", true, "30+ RSS feeds"),
    ("NLP/modaltest.py", true, "GPU deployment"),
    ("NLP/sentiment.py", true, "FinBERT API"),
    ("Kalshi/kalshi_auth.py", true, "RSA auth"),
    ("Kalshi/kalshi_order_executor.py", true, "Order execution"),
    ("Kalshi/ticker_matcher.py", false, "Semantic match"),
    ("main.py", false, "Orchestration"),
];

pub const NAV: [(&str, &str); 4] = [
    ("Pipeline", "#pipeline"),
    ("Innovation", "#innovation"),
    ("Live Feed", "#live-feed"),
    ("About", "#about"),
];

/// Main site view state.
#[derive(Debug, Default, Clone)]
pub struct MainSite {
    active_step: Option<usize>,
}

impl MainSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_step(&self) -> Option<usize> {
        self.active_step
    }

    /// Expand step `i`, or collapse it if it is already expanded.
    pub fn toggle_step(&mut self, i: usize) {
        if i >= PIPELINE_STEPS.len() {
            return;
        }
        self.active_step = if self.active_step == Some(i) { None } else { Some(i) };
    }

    /// Render the whole page, with `trades` in the live feed section.
    pub fn render(&self, trades: &[Trade]) -> String {
        let mut out = String::new();
        self.render_hero(&mut out);
        self.render_pipeline(&mut out);
        render_innovation(&mut out);
        render_live_feed(&mut out, trades);
        render_tech(&mut out);
        render_about(&mut out);
        let _ = writeln!(
            out,
            "KAT  ·  HackIllinois 2026 · University of Illinois Urbana-Champaign  ·  Not financial advice. Demo only."
        );
        out
    }

    fn render_hero(&self, out: &mut String) {
        let nav: Vec<_> = NAV.iter().map(|(label, _)| label.to_uppercase()).collect();
        let _ = writeln!(out, "KAT   {}   [● DEMO]\n", nav.join("  "));
        let _ = writeln!(out, "NEWS TO\nTRADES IN\nMILLISECONDS\n");
        let _ = writeln!(out, "KALSHI ALGORITHMIC TRADING");
        let _ = writeln!(
            out,
            "Autonomous prediction market trading. FinBERT reads breaking headlines, semantic search finds the right Kalshi contract, RSA-signed orders execute, all in under 10 seconds.\n"
        );
        let stats: Vec<_> = HERO_STATS.iter().map(|(v, l)| format!("{v} {l}")).collect();
        let _ = writeln!(out, "{}\n", stats.join("  |  "));
    }

    fn render_pipeline(&self, out: &mut String) {
        let _ = writeln!(out, "// ARCHITECTURE\nThe Full Pipeline\n");
        for (i, step) in PIPELINE_STEPS.iter().enumerate() {
            let marker = if self.active_step == Some(i) { "▸" } else { " " };
            let _ = writeln!(
                out,
                "{marker} STEP {}  {}  ({})  [{}]",
                step.id, step.title, step.subtitle, step.tag
            );
            if self.active_step == Some(i) {
                let _ = writeln!(out, "    {}", step.desc);
            }
        }
        out.push('\n');
    }
}

fn render_innovation(out: &mut String) {
    let _ = writeln!(out, "// INNOVATION\nBeyond Sentiment\n");
    let _ = writeln!(out, "THE PROBLEM: Tone ≠ Direction");
    let _ = writeln!(out, "  \"Trump indicted on 4 counts\"  FinBERT: NEGATIVE ▼ → sell YES");
    let _ = writeln!(out, "THE INNOVATION: Context-Aware LLM");
    let _ = writeln!(
        out,
        "  \"Trump indicted on 4 counts\" + \"Will Trump win the primary?\"  KAT: DIRECTIONAL ▲ → buy YES"
    );
    let _ = writeln!(out, "Stage 1 FinBERT (label · score · signal) → Stage 2 Claude Haiku (+1 / 0 / −1)\n");
}

fn render_live_feed(out: &mut String, trades: &[Trade]) {
    let _ = writeln!(out, "// EXECUTION LOG\nLive Trade Feed   ● SIMULATED LIVE\n");
    let _ = writeln!(out, "{:<9} {:<6} {:<18} {:<44} {:>4}", "TIME", "SIG", "TICKER", "HEADLINE", "CONF");
    for (i, trade) in trades.iter().enumerate() {
        // Rows older than a few ticks are dimmed.
        let dim = if DemoFeed::opacity(i) < 0.5 { "·" } else { " " };
        let _ = writeln!(out, "{trade}{dim}");
    }
    out.push('\n');
}

fn render_tech(out: &mut String) {
    let _ = writeln!(out, "// STACK\nBuilt With");
    let chips: Vec<_> = TECH.iter().map(|(n, d)| format!("[{n}: {d}]")).collect();
    let _ = writeln!(out, "{}\n", chips.join(" "));
}

fn render_about(out: &mut String) {
    let _ = writeln!(out, "// HACKILLINOIS 2026\nUniversity of Illinois Urbana-Champaign");
    for (file, done, desc) in BUILD_FILES {
        let _ = writeln!(out, "{} {:<34} {}", if done { "✅" } else { "🔨" }, file, desc);
    }
    out.push('\n');
}
