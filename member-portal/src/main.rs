fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Deterministic end-to-end intake run against the in-memory backend.
    // Writes `intake_smoke_transcript.log` under the log folder and exits 0/1.
    if args.iter().any(|a| a == "--intake-smoke") {
        member_portal::run_intake_smoke();
        return;
    }

    // Non-interactive TUI smoke test mode (for automated checks).
    // Usage: --tui-smoke or --tui-smoke=<step number|section id|complete>
    if let Some(arg) = args
        .iter()
        .find(|a| a.as_str() == "--tui-smoke" || a.starts_with("--tui-smoke="))
    {
        let target = arg
            .split_once('=')
            .map(|(_, v)| v.to_string())
            .filter(|v| !v.trim().is_empty());
        member_portal::run_tui_smoke(target);
        return;
    }

    // Sign in: --token <jwt> or --token=<jwt>
    if let Some(pos) = args
        .iter()
        .position(|a| a == "--token" || a.starts_with("--token="))
    {
        let token = match args[pos].split_once('=') {
            Some((_, v)) => Some(v.to_string()),
            None => args.get(pos + 1).cloned(),
        };
        match token.filter(|t| !t.trim().is_empty()) {
            Some(t) => member_portal::run_store_token(&t),
            None => {
                eprintln!("Usage: member-portal --token <jwt>");
                std::process::exit(2);
            }
        }
        return;
    }

    if args.iter().any(|a| a == "--logout") {
        member_portal::run_logout();
        return;
    }

    if args.iter().any(|a| a == "--init-config") {
        member_portal::run_init_config();
        return;
    }

    member_portal::run_tui();
}
