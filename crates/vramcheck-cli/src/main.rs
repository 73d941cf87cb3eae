use std::num::NonZeroU32;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{presets, Cell, CellAlignment, Color, ContentArrangement, Table};
use console::Style;
use vramcheck_core::{
    calc::{CalculationResult, Outcome, Verdict},
    hardware::{self, Catalog},
    ports::{Event, EventSink, ThemeStore},
    validate::CONTEXT_PRESETS,
    Quant, Session,
};

// ── Palette ──────────────────────────────────────────────────────────

struct Palette {
    header: Style,
    dim: Style,
    hint: Style,
    hot: Style,
    warm: Style,
    err: Style,
    accent: Style,
    label: u8,
    value: u8,
}

impl Palette {
    fn new(dark: bool) -> Self {
        if dark {
            Palette {
                header: Style::new().color256(252).bold(), // bright gray, bold
                dim: Style::new().color256(248),           // light gray
                hint: Style::new().color256(243),          // soft gray
                hot: Style::new().color256(114),           // green
                warm: Style::new().color256(214),          // amber
                err: Style::new().color256(167),           // red
                accent: Style::new().color256(109),        // teal
                label: 243,
                value: 252,
            }
        } else {
            Palette {
                header: Style::new().color256(235).bold(), // near black, bold
                dim: Style::new().color256(240),           // dark gray
                hint: Style::new().color256(245),          // mid gray
                hot: Style::new().color256(28),            // dark green
                warm: Style::new().color256(130),          // brown
                err: Style::new().color256(124),           // dark red
                accent: Style::new().color256(24),         // deep teal
                label: 245,
                value: 235,
            }
        }
    }

    fn verdict(&self, v: Verdict) -> &Style {
        match v {
            Verdict::Compatible => &self.hot,
            Verdict::Borderline => &self.warm,
            Verdict::Insufficient => &self.err,
        }
    }
}

// ── Ports ────────────────────────────────────────────────────────────

/// Theme chosen by flag/env, falling back to the terminal's background.
struct TermTheme {
    stored: Option<bool>,
}

impl ThemeStore for TermTheme {
    fn stored(&self) -> Option<bool> {
        self.stored
    }

    fn store(&mut self, dark: bool) {
        self.stored = Some(dark);
    }

    /// `COLORFGBG` is "fg;bg" (sometimes "fg;default;bg"); low bg indexes
    /// are dark backgrounds. Unknown means dark.
    fn system_prefers_dark(&self) -> bool {
        std::env::var("COLORFGBG")
            .ok()
            .and_then(|v| v.rsplit(';').next().and_then(|bg| bg.parse::<u8>().ok()))
            .map(|bg| bg < 7 || bg == 8)
            .unwrap_or(true)
    }
}

/// Analytics go to the debug log; there is no remote sink in the CLI.
struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        tracing::debug!(
            category = event.category,
            action = event.action,
            label = event.label.as_deref().unwrap_or(""),
            "event"
        );
    }
}

// ── CLI Args ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Dark,
    Light,
}

#[derive(Parser)]
#[command(
    name = "vramcheck",
    about = "Check whether an LLM fits your GPUs: VRAM, system RAM, tokens/s and power",
    version,
    after_help = "examples:\n  \
        vramcheck 7 --gpu rtx4090\n  \
        vramcheck 70 -q 4 --gpu a100-80gb:2\n  \
        vramcheck 13 --gpu 3090 --gpu 4090 -c 32768\n  \
        vramcheck 8 --gpu m3 --json\n  \
        vramcheck 13 --custom-vram 20:2       (card not in the list)\n  \
        vramcheck gpus                        (list known GPUs)"
)]
struct Cli {
    /// Parameter count in billions, e.g. 7 or 6.7
    params: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,

    /// GPU as KEY or KEY:COUNT, repeatable (e.g. rtx4090:2)
    #[arg(long = "gpu", short = 'g')]
    gpus: Vec<String>,

    /// GPU not in the list, by VRAM per unit: GB or GB:COUNT, repeatable
    #[arg(long = "custom-vram", value_name = "GB[:COUNT]")]
    custom_vram: Vec<String>,

    /// Quantization in bits: 4, 8, 16 or 32
    #[arg(long, short, default_value_t = 16)]
    quant: u32,

    /// Context length in tokens
    #[arg(long, short, default_value = "4096")]
    context: NonZeroU32,

    #[arg(long, short, global = true)]
    json: bool,

    /// Replacement accelerators.toml
    #[arg(long, global = true, env = "VRAMCHECK_CATALOG")]
    catalog: Option<PathBuf>,

    #[arg(long, global = true, env = "VRAMCHECK_THEME")]
    theme: Option<ThemeArg>,
}

#[derive(Subcommand)]
enum Commands {
    /// List the GPU catalog.
    Gpus,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let owned;
    let catalog: &Catalog = match &cli.catalog {
        Some(path) => {
            owned = hardware::load_catalog(path)?;
            tracing::debug!(path = %path.display(), gpus = owned.len(), "loaded catalog");
            &owned
        }
        None => hardware::bundled(),
    };

    let theme = TermTheme {
        stored: cli.theme.map(|t| matches!(t, ThemeArg::Dark)),
    };
    let pal = Palette::new(theme.is_dark());

    match cli.command {
        Some(Commands::Gpus) => cmd_gpus(catalog, &pal, cli.json),
        None => cmd_check(catalog, &pal, &cli),
    }
}

// ── GPU parsing ──────────────────────────────────────────────────────

/// Split `a100-80gb:2` into `("a100-80gb", "2")`. Count defaults to 1.
fn split_gpu_arg(raw: &str) -> (&str, &str) {
    match raw.rsplit_once(':') {
        Some((key, count)) => (key, count),
        None => (raw, "1"),
    }
}

// ── Check ────────────────────────────────────────────────────────────

fn cmd_check(catalog: &Catalog, pal: &Palette, cli: &Cli) -> anyhow::Result<()> {
    let sink = TracingSink;
    let mut session = Session::new(catalog, &sink);

    // The session starts with one empty row; later GPUs append.
    let mut first = true;
    for raw in &cli.gpus {
        let (input, count) = split_gpu_arg(raw);
        let (key, _) = catalog
            .find(input)
            .ok_or_else(|| anyhow::anyhow!("no GPU matching '{input}' (see `vramcheck gpus`)"))?;
        let row = if std::mem::take(&mut first) { 0 } else { session.add_selection() };
        session.set_accelerator(row, Some(key))?;
        session.set_count(row, count)?;
    }
    for raw in &cli.custom_vram {
        let (vram, count) = split_gpu_arg(raw);
        let row = if std::mem::take(&mut first) { 0 } else { session.add_selection() };
        session.set_custom_vram(row, Some(vram))?;
        session.set_count(row, count)?;
    }
    session.set_quantization(cli.quant);
    session.set_context_length(cli.context);
    let outcome = session.set_parameters(cli.params.as_deref().unwrap_or(""));

    if cli.json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    if outcome.is_quiescent() {
        println!(
            "{}",
            pal.hint
                .apply_to("  enter a parameter count, e.g. `vramcheck 7 --gpu rtx4090`")
        );
        return Ok(());
    }

    if let Some((field, reason)) = outcome.errors.iter().next() {
        anyhow::bail!("{reason} ({field})");
    }

    if let Some(result) = &outcome.result {
        print_result(pal, cli, result, outcome);
    }
    Ok(())
}

fn print_result(pal: &Palette, cli: &Cli, r: &CalculationResult, outcome: &Outcome) {
    let m = &r.memory;
    let quant = Quant::from_bits(cli.quant).unwrap_or(Quant::FP16);

    println!();
    println!("  {}", pal.header.apply_to(&r.config_summary));
    let context = cli.context.get();
    let context_note = if CONTEXT_PRESETS.contains(&context) {
        format!("{}k context", context / 1024)
    } else {
        format!("{context} token context")
    };
    println!(
        "  {}",
        pal.dim.apply_to(format!(
            "{}B params  \u{00b7}  {}  \u{00b7}  {context_note}",
            cli.params.as_deref().unwrap_or("").trim(),
            quant.label(),
        ))
    );

    println!();
    println!("  {}", pal.verdict(r.verdict).apply_to(r.verdict.label()));
    let speed = match r.tokens_per_second {
        Some(tps) => format!(" Estimated {tps} tokens/second."),
        None => String::new(),
    };
    let detail = match r.verdict {
        Verdict::Compatible => format!(
            "Can handle this model with {:.2}GB VRAM to spare.{speed}",
            m.margin_gb
        ),
        Verdict::Borderline => format!(
            "Will work with only {:.2}GB VRAM margin; consider a shorter context or more GPUs.{speed}",
            m.margin_gb
        ),
        Verdict::Insufficient => format!("Lacks {:.2}GB VRAM. Consider:", m.margin_gb.abs()),
    };
    println!("  {}", pal.dim.apply_to(detail));
    for remedy in r.verdict.remedies() {
        println!("    {}", pal.dim.apply_to(format!("\u{2022} {remedy}")));
    }

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    let label = |s: &str| Cell::new(format!("  {s}")).fg(Color::AnsiValue(pal.label));
    let value = |s: String| {
        Cell::new(s)
            .fg(Color::AnsiValue(pal.value))
            .set_alignment(CellAlignment::Right)
    };
    let rows: Vec<(&str, String)> = vec![
        ("Required VRAM", format!("{:.2} GB", m.total_required_gb)),
        ("  base model", format!("{:.2} GB", m.base_model_gb)),
        ("  KV cache", format!("{:.2} GB", m.kv_cache_gb)),
        ("  overhead", format!("{:.2} GB", m.gpu_overhead_gb)),
        ("Available VRAM", format!("{:.2} GB", m.effective_available_gb)),
        ("VRAM margin", format!("{:.2} GB", m.margin_gb)),
        ("System RAM", format!("{:.2} GB", m.host_ram_gb)),
        ("  recommended minimum", format!("{} GB", m.min_host_ram_gb)),
        ("Storage", format!("{:.2} GB", m.storage_gb)),
        ("CPU cores", format!("{}+", m.recommended_cores)),
        (
            "Performance",
            r.tokens_per_second
                .map_or_else(|| "n/a (custom GPU)".to_string(), |t| format!("{t} t/s")),
        ),
        ("Power draw", format!("{} W", r.power.total_w)),
    ];
    for (l, v) in rows {
        table.add_row(vec![label(l), value(v)]);
    }
    println!();
    println!("{table}");

    if !m.host_ram_met {
        println!(
            "  {}",
            pal.warm.apply_to(format!(
                "system RAM estimate is below the {}GB recommended minimum",
                m.min_host_ram_gb
            ))
        );
    }

    let mut power = Table::new();
    power.load_preset(presets::NOTHING);
    power.set_content_arrangement(ContentArrangement::Dynamic);
    power.set_header(vec![
        Cell::new("  GPU").fg(Color::AnsiValue(pal.label)),
        Cell::new("Count").fg(Color::AnsiValue(pal.label)),
        Cell::new("Per GPU").fg(Color::AnsiValue(pal.label)),
        Cell::new("Total").fg(Color::AnsiValue(pal.label)),
    ]);
    for s in &r.power.selections {
        power.add_row(vec![
            Cell::new(format!("  {}", s.name)).fg(Color::AnsiValue(pal.value)),
            Cell::new(s.count).fg(Color::AnsiValue(pal.value)),
            Cell::new(format!("{} W", s.per_unit_w)).fg(Color::AnsiValue(pal.value)),
            Cell::new(format!("{} W", s.total_w)).fg(Color::AnsiValue(pal.value)),
        ]);
    }
    power.add_row(vec![
        Cell::new("  System").fg(Color::AnsiValue(pal.label)),
        Cell::new(""),
        Cell::new(""),
        Cell::new(format!("{} W", r.power.system_overhead_w)).fg(Color::AnsiValue(pal.value)),
    ]);
    println!();
    println!(
        "  {}",
        pal.accent.apply_to(format!(
            "power at {:.0}% utilization",
            r.power.utilization * 100.0
        ))
    );
    println!("{power}");

    if !outcome.warnings.is_empty() {
        println!();
        println!("  {}", pal.warm.apply_to("notes"));
        for w in &outcome.warnings {
            println!("  {}", pal.dim.apply_to(format!("  {w}")));
        }
    }
    println!();
}

// ── GPUs ─────────────────────────────────────────────────────────────

fn cmd_gpus(catalog: &Catalog, pal: &Palette, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(catalog.list_ordered())?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("  Key").fg(Color::AnsiValue(pal.label)),
        Cell::new("Name").fg(Color::AnsiValue(pal.label)),
        Cell::new("VRAM").fg(Color::AnsiValue(pal.label)),
        Cell::new("Generation").fg(Color::AnsiValue(pal.label)),
        Cell::new("TFLOPS").fg(Color::AnsiValue(pal.label)),
        Cell::new("TDP").fg(Color::AnsiValue(pal.label)),
    ]);
    for (key, gpu) in catalog.list_ordered() {
        table.add_row(vec![
            Cell::new(format!("  {key}")).fg(Color::AnsiValue(109)),
            Cell::new(&gpu.name).fg(Color::AnsiValue(pal.value)),
            Cell::new(format!("{:.0} GB", gpu.vram_gb)).fg(Color::AnsiValue(pal.value)),
            Cell::new(gpu.generation.label()).fg(Color::AnsiValue(pal.value)),
            Cell::new(format!("{:.1}", gpu.tflops)).fg(Color::AnsiValue(pal.value)),
            Cell::new(format!("{}W", gpu.tdp_w)).fg(Color::AnsiValue(pal.value)),
        ]);
    }
    println!();
    println!("{table}");
    println!();
    println!(
        "{}",
        pal.hint.apply_to(format!("  {} GPUs   use: --gpu KEY[:COUNT]", catalog.len()))
    );
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_gpu_arg_with_and_without_count() {
        assert_eq!(split_gpu_arg("rtx4090"), ("rtx4090", "1"));
        assert_eq!(split_gpu_arg("a100-80gb:2"), ("a100-80gb", "2"));
        assert_eq!(split_gpu_arg("rx7900xtx:"), ("rx7900xtx", ""));
    }

    #[test]
    fn cli_parses_repeated_gpus() {
        let cli = Cli::parse_from(["vramcheck", "13", "--gpu", "3090", "-g", "4090:2", "-q", "4"]);
        assert_eq!(cli.params.as_deref(), Some("13"));
        assert_eq!(cli.gpus, ["3090", "4090:2"]);
        assert_eq!(cli.quant, 4);
        assert_eq!(cli.context.get(), 4096);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_parses_custom_vram() {
        let cli = Cli::parse_from(["vramcheck", "13", "--custom-vram", "20:2", "--custom-vram", "11.5"]);
        assert!(cli.gpus.is_empty());
        assert_eq!(cli.custom_vram, ["20:2", "11.5"]);
        assert_eq!(split_gpu_arg(&cli.custom_vram[0]), ("20", "2"));
        assert_eq!(split_gpu_arg(&cli.custom_vram[1]), ("11.5", "1"));
    }

    #[test]
    fn cli_parses_gpus_subcommand() {
        let cli = Cli::parse_from(["vramcheck", "gpus", "--json"]);
        assert!(matches!(cli.command, Some(Commands::Gpus)));
        assert!(cli.json);
        assert!(cli.params.is_none());
    }

    #[test]
    fn cli_rejects_zero_context() {
        assert!(Cli::try_parse_from(["vramcheck", "7", "-c", "0"]).is_err());
    }

    #[test]
    fn stored_theme_wins() {
        assert!(!TermTheme { stored: Some(false) }.is_dark());
        assert!(TermTheme { stored: Some(true) }.is_dark());
    }
}
