//! Parser for kickstart provisioning documents.
//!
//! Handles the line-oriented kickstart format:
//! ```text
//! selinux --enforcing
//! network --bootproto=dhcp --device=eth0 --onboot=on
//! part / --fstype="xfs" --size=4096 --grow
//!
//! %packages --nobase
//! @core
//! cloud-init
//! -NetworkManager
//! %end
//!
//! %post --log=/root/post.log
//! sed -i 's/^#PermitRootLogin.*/PermitRootLogin no/' /etc/ssh/sshd_config
//! %end
//! ```

use crate::error::{Error, Result};
use crate::types::{keyword, Directive, PackageList, PostScript, ProvisioningDocument};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Parse a document from a file path.
pub fn parse_file(path: &Path) -> Result<ProvisioningDocument> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    let mut document = parse_string(&content)?;
    document.path = Some(path.to_path_buf());
    Ok(document)
}

/// Parse a document from a string.
///
/// Syntax is checked line by line; document invariants that span several
/// items (package conflicts) are checked once the whole text is read.
pub fn parse_string(content: &str) -> Result<ProvisioningDocument> {
    let mut parser = Parser::default();
    for (index, line) in content.lines().enumerate() {
        parser.feed(line, index + 1)?;
    }
    let document = parser.finish()?;
    document.validate()?;
    Ok(document)
}

/// Which block the parser is inside.
#[derive(Debug)]
enum Section {
    Commands,
    Packages(PackageList),
    Post(PostScript),
}

#[derive(Debug)]
struct Parser {
    document: ProvisioningDocument,
    section: Section,
    /// First line of each exclusive directive or block seen so far
    seen: HashMap<String, usize>,
}

impl Default for Parser {
    fn default() -> Self {
        Self {
            document: ProvisioningDocument::new(),
            section: Section::Commands,
            seen: HashMap::new(),
        }
    }
}

impl Parser {
    fn feed(&mut self, raw: &str, line_num: usize) -> Result<()> {
        let trimmed = raw.trim();

        match &mut self.section {
            Section::Post(script) => {
                if trimmed == "%end" {
                    self.close_section();
                } else {
                    // Script text is opaque, keep it verbatim
                    script.body.push(raw.to_string());
                }
                Ok(())
            }
            Section::Packages(list) => {
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return Ok(());
                }
                if trimmed == "%end" {
                    self.close_section();
                    return Ok(());
                }
                if trimmed.starts_with('%') {
                    return Err(Error::Syntax {
                        line: line_num,
                        message: format!("'{trimmed}' inside %packages (missing %end?)"),
                    });
                }
                match trimmed.strip_prefix('-').map(str::trim) {
                    Some("") => {
                        return Err(Error::MalformedOption {
                            line: line_num,
                            message: "'-' without a package name".to_string(),
                        });
                    }
                    Some(name) => list.exclude.insert(name.to_string()),
                    None => list.install.insert(trimmed.to_string()),
                };
                Ok(())
            }
            Section::Commands => {
                if trimmed.is_empty() || trimmed.starts_with('#') {
                    return Ok(());
                }
                if trimmed.starts_with('%') {
                    return self.open_section(trimmed, line_num);
                }
                let directive = parse_directive(trimmed, line_num)?;
                if keyword(&directive.name).is_some_and(|k| k.exclusive) {
                    self.claim(&directive.name, line_num)?;
                }
                self.document.push(directive);
                Ok(())
            }
        }
    }

    fn open_section(&mut self, header: &str, line_num: usize) -> Result<()> {
        let tokens = tokenize(header, line_num)?;
        let (name, rest) = tokens.split_first().ok_or_else(|| Error::Syntax {
            line: line_num,
            message: "empty section header".to_string(),
        })?;
        let (options, positional) = parse_tokens(rest, line_num)?;
        if let Some(extra) = positional.first() {
            return Err(Error::MalformedOption {
                line: line_num,
                message: format!("unexpected argument '{extra}' in {name} header"),
            });
        }

        match name.as_str() {
            "%packages" => {
                self.claim("%packages", line_num)?;
                self.section = Section::Packages(PackageList {
                    options,
                    line: line_num,
                    ..Default::default()
                });
            }
            "%post" => {
                self.claim("%post", line_num)?;
                self.section = Section::Post(post_script_header(options, line_num)?);
            }
            "%end" => {
                return Err(Error::Syntax {
                    line: line_num,
                    message: "%end without an open section".to_string(),
                });
            }
            other => {
                return Err(Error::Syntax {
                    line: line_num,
                    message: format!("unsupported section '{other}'"),
                });
            }
        }
        Ok(())
    }

    fn close_section(&mut self) {
        match std::mem::replace(&mut self.section, Section::Commands) {
            Section::Packages(list) => self.document.set_packages(list),
            Section::Post(script) => self.document.set_post_script(script),
            Section::Commands => {}
        }
    }

    /// Record an exclusive name, failing if it was already declared.
    fn claim(&mut self, name: &str, line_num: usize) -> Result<()> {
        if let Some(&first_line) = self.seen.get(name) {
            return Err(Error::DuplicateDirective {
                line: line_num,
                name: name.to_string(),
                first_line,
            });
        }
        self.seen.insert(name.to_string(), line_num);
        Ok(())
    }

    fn finish(self) -> Result<ProvisioningDocument> {
        match self.section {
            Section::Commands => Ok(self.document),
            Section::Packages(list) => Err(Error::Syntax {
                line: list.line,
                message: "unterminated %packages section".to_string(),
            }),
            Section::Post(script) => Err(Error::Syntax {
                line: script.line,
                message: "unterminated %post section".to_string(),
            }),
        }
    }
}

/// Build a post-script from its header options.
fn post_script_header(
    mut options: BTreeMap<String, Option<String>>,
    line_num: usize,
) -> Result<PostScript> {
    let mut script = PostScript {
        line: line_num,
        ..Default::default()
    };

    script.interpreter = take_value(&mut options, "interpreter", line_num)?;
    script.log = take_value(&mut options, "log", line_num)?;
    script.nochroot = options.remove("nochroot").is_some();
    script.error_on_fail = options.remove("erroronfail").is_some();

    if let Some(unknown) = options.keys().next() {
        return Err(Error::MalformedOption {
            line: line_num,
            message: format!("unknown %post option '--{unknown}'"),
        });
    }
    Ok(script)
}

fn take_value(
    options: &mut BTreeMap<String, Option<String>>,
    key: &str,
    line_num: usize,
) -> Result<Option<String>> {
    match options.remove(key) {
        None => Ok(None),
        Some(Some(value)) => Ok(Some(value)),
        Some(None) => Err(Error::MalformedOption {
            line: line_num,
            message: format!("'--{key}' requires a value"),
        }),
    }
}

/// Parse a single directive line.
fn parse_directive(line: &str, line_num: usize) -> Result<Directive> {
    let tokens = tokenize(line, line_num)?;
    let Some((name, rest)) = tokens.split_first() else {
        return Err(Error::Syntax {
            line: line_num,
            message: "empty directive".to_string(),
        });
    };

    let keyword = keyword(name).ok_or_else(|| Error::UnknownDirective {
        line: line_num,
        name: name.clone(),
    })?;

    let (arguments, positional) = parse_tokens(rest, line_num)?;

    Ok(Directive {
        name: keyword.name.to_string(),
        arguments,
        positional,
        position: 0,
        line: line_num,
    })
}

/// Split option tokens (`--key=value`, `--flag`) from positional words.
fn parse_tokens(
    tokens: &[String],
    line_num: usize,
) -> Result<(BTreeMap<String, Option<String>>, Vec<String>)> {
    let mut options = BTreeMap::new();
    let mut positional = Vec::new();

    for token in tokens {
        let Some(body) = token.strip_prefix("--") else {
            positional.push(token.clone());
            continue;
        };

        let (key, value) = match body.split_once('=') {
            Some((key, value)) => (key, Some(value.to_string())),
            None => (body, None),
        };

        if key.is_empty() {
            return Err(Error::MalformedOption {
                line: line_num,
                message: format!("missing option name in '{token}'"),
            });
        }
        if options.insert(key.to_string(), value).is_some() {
            return Err(Error::MalformedOption {
                line: line_num,
                message: format!("option '--{key}' given more than once"),
            });
        }
    }

    Ok((options, positional))
}

/// Split a line into whitespace-separated tokens, honoring quotes.
///
/// Quotes may open mid-token (`--append="console=ttyS0 quiet"`) and are
/// removed from the resulting token.
fn tokenize(line: &str, line_num: usize) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(Error::MalformedOption {
            line: line_num,
            message: "unclosed quote".to_string(),
        });
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}
