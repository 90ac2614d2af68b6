use intime::ipc;

fn main() {
    let mut args = std::env::args().skip(1);
    let Some(command) = args.next() else {
        eprintln!(
            "Usage: intimectl <command> [args]\n\
             Commands: status, reload_config, forbidden_alarm <class|title|message>,\n\
             dismiss_alarm, reset_deadline, toggle_screen_sampling"
        );
        std::process::exit(1);
    };

    let request = match args.next() {
        Some(payload) => format!("{command}:{payload}"),
        None => command,
    };

    match ipc::invoke_daemon(&request) {
        Ok(response) => {
            let failed = response.starts_with("ERROR:");
            println!("{}", response);
            if failed {
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}
