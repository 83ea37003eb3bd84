use botsdk::{ContextProvider, Request, RuleReport, Token};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_reports(request: &Request, reports: &[RuleReport], color: bool) {
    let palette = ansi::Palette::new(color);

    println!("\n{}", palette.paint("━━━ Turn ━━━", ansi::GRAY));
    println!(
        "  {} {}  {} {}",
        palette.dim("type:"),
        palette.paint(request.request_type(), ansi::BLUE),
        palette.dim("│ intent:"),
        palette.paint(request.current_intent_name().unwrap_or("-"), ansi::CYAN),
    );

    for (idx, report) in reports.iter().enumerate() {
        println!("\n{}", palette.paint(format!("━━━ Rule [{idx}] ━━━"), ansi::GRAY));
        print_report(report, &palette);
    }

    let matched = reports.iter().filter(|r| r.is_match()).count();
    println!("\n{}", palette.paint("━━━ Summary ━━━", ansi::GRAY));
    println!(
        "  {} of {} rules matched  │  first match: {}",
        palette.paint(matched.to_string(), ansi::GREEN),
        reports.len(),
        match reports.iter().position(RuleReport::is_match) {
            Some(idx) => palette.bold(format!("[{idx}]")),
            None => palette.dim("none"),
        }
    );
    println!();
}

fn print_report(report: &RuleReport, palette: &ansi::Palette) {
    println!("  {} {}", palette.dim("rule:"), palette.bold(format!("{:?}", report.rule)));

    if report.tokens.is_empty() {
        println!("  {} {}", palette.dim("tokens:"), palette.dim("(none)"));
    } else {
        println!("  {}", palette.dim("tokens:"));
        for token in &report.tokens {
            println!("    {}", fmt_token(token, palette));
        }
    }

    if let Some(resolved) = &report.resolved {
        println!("  {} {}", palette.dim("resolved:"), palette.paint(resolved, ansi::YELLOW));
    }

    let verdict = match (report.matched, &report.error) {
        (Some(true), _) => palette.bold(palette.paint("✓ match", ansi::GREEN)),
        (Some(false), _) => palette.dim("✗ no match"),
        (None, Some(err)) => palette.paint(format!("✗ error: {err}"), ansi::RED),
        (None, None) => palette.dim("✗ no match"),
    };
    println!("  {} {}  {}", palette.dim("verdict:"), verdict, palette.dim(format!("({:?})", report.elapsed)));
}

fn fmt_token(token: &Token, palette: &ansi::Palette) -> String {
    if token.is_literal() {
        format!("{} {}", palette.paint("literal", ansi::BLUE), palette.paint(format!("{:?}", token.text), ansi::GREEN))
    } else {
        format!("{} {}", palette.paint("code   ", ansi::CYAN), palette.dim(format!("{:?}", token.text)))
    }
}
