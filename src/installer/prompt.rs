//! Manifest display and trust confirmation for unverified modules.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use super::manifest::Manifest;

/// Operator-facing side of an install
#[async_trait]
pub trait TrustPrompt: Send + Sync {
    /// Present the manifest of a module about to be built
    fn show(&self, name: &str, manifest: &Manifest);

    /// `true` to proceed with the install of unverified module `name`
    async fn confirm(&self, name: &str, manifest: &Manifest) -> bool;
}

/// Interactive prompt on the operator's terminal
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl TrustPrompt for StdinPrompt {
    fn show(&self, _name: &str, manifest: &Manifest) {
        let _ = show_manifest(&mut io::stdout().lock(), manifest);
    }

    async fn confirm(&self, name: &str, _manifest: &Manifest) -> bool {
        let name = name.to_string();
        let answer = tokio::task::spawn_blocking(move || {
            let stdin = io::stdin();
            let stdout = io::stdout();
            ask(&mut stdin.lock(), &mut stdout.lock(), &name)
        })
        .await;

        // An unreadable terminal counts as a refusal
        matches!(answer, Ok(Ok(true)))
    }
}

/// Accepts everything (`install --yes`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

#[async_trait]
impl TrustPrompt for AssumeYes {
    fn show(&self, _name: &str, manifest: &Manifest) {
        let _ = show_manifest(&mut io::stdout().lock(), manifest);
    }

    async fn confirm(&self, _name: &str, _manifest: &Manifest) -> bool {
        true
    }
}

/// Write the manifest block surrounded by blank lines
pub fn show_manifest<W: Write>(writer: &mut W, manifest: &Manifest) -> io::Result<()> {
    writeln!(writer)?;
    writeln!(writer, "{manifest}")?;
    writeln!(writer)?;
    writer.flush()
}

/// Ask for a yes/no answer
pub fn ask<R, W>(reader: &mut R, writer: &mut W, name: &str) -> io::Result<bool>
where
    R: BufRead,
    W: Write,
{
    write!(
        writer,
        "  ⚠  {name} is unverified (community module). Install anyway? (y/n): "
    )?;
    writer.flush()?;

    let mut answer = String::new();
    reader.read_line(&mut answer)?;

    let accepted = is_yes(&answer);
    if !accepted {
        writeln!(writer, "  aborted.")?;
    }
    Ok(accepted)
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
