//! Writer for generating kickstart document text.
//!
//! Output is canonical rather than byte-identical to the input: directive
//! names use their canonical spelling, options are sorted, and comments
//! outside `%post` are dropped. Parsing the output yields the same
//! directives, packages and script.

use crate::types::{Directive, PackageList, PostScript, ProvisioningDocument};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;

/// Write a document to a file.
pub fn write_file(document: &ProvisioningDocument, path: &Path) -> std::io::Result<()> {
    std::fs::write(path, write_string(document))
}

/// Write a document to a string.
pub fn write_string(document: &ProvisioningDocument) -> String {
    enum Item<'a> {
        Directive(&'a Directive),
        Packages(&'a PackageList),
        Post(&'a PostScript),
    }

    let mut items: Vec<(usize, Item)> = document
        .directives
        .iter()
        .map(|d| (d.position, Item::Directive(d)))
        .collect();
    if let Some(packages) = &document.packages {
        items.push((packages.position, Item::Packages(packages)));
    }
    if let Some(post) = &document.post_script {
        items.push((post.position, Item::Post(post)));
    }
    items.sort_by_key(|(position, _)| *position);

    let mut output = String::new();
    let mut after_block = false;
    for (_, item) in items {
        match item {
            Item::Directive(directive) => {
                if after_block {
                    output.push('\n');
                    after_block = false;
                }
                write_directive(&mut output, directive);
            }
            Item::Packages(packages) => {
                if !output.is_empty() {
                    output.push('\n');
                }
                write_packages(&mut output, packages);
                after_block = true;
            }
            Item::Post(post) => {
                if !output.is_empty() {
                    output.push('\n');
                }
                write_post(&mut output, post);
                after_block = true;
            }
        }
    }

    output
}

/// Write a single directive line.
pub fn write_directive(output: &mut String, directive: &Directive) {
    output.push_str(&directive.name);
    for word in &directive.positional {
        write!(output, " {}", quote(word)).unwrap();
    }
    write_options(output, &directive.arguments);
    output.push('\n');
}

fn write_packages(output: &mut String, packages: &PackageList) {
    output.push_str("%packages");
    write_options(output, &packages.options);
    output.push('\n');
    for name in &packages.install {
        writeln!(output, "{name}").unwrap();
    }
    for name in &packages.exclude {
        writeln!(output, "-{name}").unwrap();
    }
    output.push_str("%end\n");
}

fn write_post(output: &mut String, post: &PostScript) {
    output.push_str("%post");
    if post.nochroot {
        output.push_str(" --nochroot");
    }
    if post.error_on_fail {
        output.push_str(" --erroronfail");
    }
    if let Some(interpreter) = &post.interpreter {
        write!(output, " --interpreter={}", quote(interpreter)).unwrap();
    }
    if let Some(log) = &post.log {
        write!(output, " --log={}", quote(log)).unwrap();
    }
    output.push('\n');
    for line in &post.body {
        writeln!(output, "{line}").unwrap();
    }
    output.push_str("%end\n");
}

fn write_options(output: &mut String, options: &BTreeMap<String, Option<String>>) {
    for (key, value) in options {
        match value {
            Some(value) => write!(output, " --{key}={}", quote(value)).unwrap(),
            None => write!(output, " --{key}").unwrap(),
        }
    }
}

/// Quote a value when it would not survive tokenizing as-is.
///
/// A value holding both quote characters is split into runs that each hold
/// only one kind; the tokenizer joins adjacent quoted runs back together.
fn quote(value: &str) -> String {
    let needs_quotes =
        value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'');
    if !needs_quotes {
        return value.to_string();
    }

    let mut quoted = String::new();
    let mut run = String::new();
    for c in value.chars() {
        let clash = (c == '"' && run.contains('\'')) || (c == '\'' && run.contains('"'));
        if clash {
            quoted.push_str(&quote_run(&run));
            run.clear();
        }
        run.push(c);
    }
    quoted.push_str(&quote_run(&run));
    quoted
}

fn quote_run(run: &str) -> String {
    if run.contains('"') {
        format!("'{run}'")
    } else {
        format!("\"{run}\"")
    }
}
