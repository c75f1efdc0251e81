//! `smap negotiate` command implementation.

use std::path::PathBuf;

use clap::Args;
use smap_config::{CliSettings, Config};
use smap_negotiate::{
    ClientPreferences, NegotiationError, NegotiationPolicy, PreferenceList, Unacceptable,
};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for the negotiate command.
#[derive(Args)]
pub(crate) struct NegotiateArgs {
    /// Path to configuration file (default: auto-discover smap.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Client `Accept` header.
    #[arg(long, env = "HTTP_ACCEPT")]
    accept: Option<String>,

    /// Client `Accept-Charset` header.
    #[arg(long, env = "HTTP_ACCEPT_CHARSET")]
    accept_charset: Option<String>,

    /// Client `Accept-Language` header.
    #[arg(long, env = "HTTP_ACCEPT_LANGUAGE")]
    accept_language: Option<String>,

    /// Media types the server offers, in header syntax.
    #[arg(long, default_value = "text/html, application/xhtml+xml;q=0.9")]
    types: String,

    /// Charsets the server offers, in header syntax.
    #[arg(long, default_value = "utf-8, iso-8859-1;q=0.5")]
    charsets: String,

    /// Languages the server offers, in header syntax.
    #[arg(long, default_value = "en")]
    languages: String,

    /// Fail instead of falling back when nothing offered is acceptable.
    #[arg(long)]
    reject: bool,
}

/// Negotiated representation.
#[derive(Debug, PartialEq)]
struct Negotiated {
    media_type: String,
    charset: String,
    language: String,
}

/// Negotiate all three dimensions against the server's offers.
fn negotiate_all(
    client: &ClientPreferences,
    types: &str,
    charsets: &str,
    languages: &str,
    policy: NegotiationPolicy,
) -> Result<Negotiated, NegotiationError> {
    let types = PreferenceList::parse(types);
    let charsets = PreferenceList::parse(charsets);
    let languages = PreferenceList::parse_language(languages);

    Ok(Negotiated {
        media_type: client.media_type(&types, policy)?.value().to_owned(),
        charset: client.charset(&charsets, policy)?.value().to_owned(),
        language: client.language(&languages, policy)?.to_string(),
    })
}

impl NegotiateArgs {
    /// Execute the negotiate command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or negotiation is rejected.
    pub(crate) fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = CliSettings {
            on_unacceptable: self.reject.then_some(Unacceptable::Reject),
            ..CliSettings::default()
        };
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let client = ClientPreferences::from_headers(
            self.accept.as_deref(),
            self.accept_charset.as_deref(),
            self.accept_language.as_deref(),
        );
        let negotiated = negotiate_all(
            &client,
            &self.types,
            &self.charsets,
            &self.languages,
            config.negotiation,
        )?;

        output.field(
            "Content-Type",
            &format!("{}; charset={}", negotiated.media_type, negotiated.charset),
        );
        output.field("Content-Language", &negotiated.language);
        Ok(())
    }
}
