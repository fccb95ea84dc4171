/// Handle one-shot commands that need neither config nor hub: help and version.
/// Returns true if the command was handled and the program should exit.
pub fn handle_specials_if_needed(arg: &str) -> bool {
    if matches!(arg, "" | "help" | "--help" | "-H" | "-h" | "-?") {
        println!("{}", usage());
        return true;
    }

    if matches!(arg, "version" | "--version" | "-V" | "-v") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return true;
    }

    false
}

pub fn usage() -> &'static str {
    concat!(
        "remodel: evolve web projects by conversation\n\n",
        "  $ remodel new a pomodoro timer with a dark theme\n",
        "  $ remodel <project-id> make the start button larger\n",
        "  $ echo 'add a reset button' | remodel <project-id>\n",
        "  $ remodel list | files <project-id> | rename <project-id> <title> | delete <project-id>\n",
        "  $ remodel watch          # print project updates as they land\n",
        "  $ remodel serve          # run the hub in the foreground\n"
    )
}
