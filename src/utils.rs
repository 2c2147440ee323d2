use std::path::Path;

use itertools::Itertools;

pub fn progress_bar(length: u64, message: String) -> indicatif::ProgressBar {
    // Progress bar
    let progress_style = indicatif::ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    )
    .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
    .progress_chars("##-");

    let progress_bar = indicatif::ProgressBar::new(length);
    progress_bar.set_style(progress_style);
    progress_bar.set_message(message);
    progress_bar
}

/// Pull a version out of the output of `<tool> --version`.
///
/// The version is taken to be the last space separated field of the first line,
/// e.g. `samtools 1.17` or `/usr/bin/bowtie-align-s version 1.3.1`.
pub fn parse_version(output: &str) -> Option<String> {
    let first_line = output.lines().next()?.trim();
    first_line
        .split(' ')
        .filter(|field| !field.is_empty())
        .last()
        .map(|field| field.to_string())
}

/// methylpy parses its boolean options with Python's spelling.
pub fn py_bool(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Directory arguments are handed to methylpy with a trailing slash.
pub fn dir_arg(dir: &Path) -> String {
    let dir = dir.display().to_string();
    if dir.is_empty() || dir.ends_with('/') {
        dir
    } else {
        format!("{}/", dir)
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));

    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Render a command line so that it can be pasted into a POSIX shell.
pub fn shell_join<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    std::iter::once(shell_quote(program))
        .chain(args.iter().map(|arg| shell_quote(arg.as_ref())))
        .join(" ")
}

/// Local time in the same layout as C's `asctime`.
pub fn timestamp() -> String {
    chrono::Local::now().format("%a %b %e %H:%M:%S %Y").to_string()
}
