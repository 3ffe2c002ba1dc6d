//! Proposal voting.
//!
//! ```text
//! !startvote [name] [option1, option2, ...]   one vote at a time
//! !vote +option    !vote -option    !vote option
//! +option    -option    +1    -1    \1        implicit votes
//! !abstain    !cancelvotes    !countvotes    !endvote
//! ```
//!
//! Without options a vote is boolean: voters are for (`+1`), against (`-1`)
//! or abstain (`\1`). Thumbs up/down emoji and the various dashes work as
//! vote symbols too. State lives in the store as JSON under `name`,
//! `options`, `votes` and `changes_since_countvote`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use botbot_core::{Line, Reply};
use botbot_framework::{
    ConfigField, HandlerResult, Plugin, PluginContext, Route, RouteArgs, listens_to_all,
    listens_to_command, listens_to_regex_command, module_slug,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

const DEFAULT_VOTE_OPTION: &str = "__vote__";
const ABSTAIN_OPTION: &str = "__abstain__";
const ABSTAIN_WORD: &str = "abstain";

const NAME_KEY: &str = "name";
const OPTIONS_KEY: &str = "options";
const VOTES_KEY: &str = "votes";
const CHANGES_KEY: &str = "changes_since_countvote";

const NO_VOTE_STARTED: &str = "No vote has been started. Use the “startvote” command to do so.";
const VOTING_STARTED: &str = "Voting has started.";
const VOTING_ENDED: &str = "Voting has ended.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    For,
    Against,
}

impl Side {
    fn opposing(self) -> Self {
        match self {
            Side::For => Side::Against,
            Side::Against => Side::For,
        }
    }
}

/// Vote symbols in match order. Skin-tone variants precede the plain emoji
/// so the longer sequence wins. The empty symbol is what `!vote option`
/// parses to.
const VOTE_SYMBOLS: &[(&str, Side)] = &[
    ("+", Side::For),
    ("👍🏻", Side::For),
    ("👍🏼", Side::For),
    ("👍🏽", Side::For),
    ("👍🏾", Side::For),
    ("👍🏿", Side::For),
    ("👍", Side::For),
    ("😍", Side::For),
    ("😻", Side::For),
    ("-", Side::Against),
    ("\u{2013}", Side::Against),
    ("\u{2014}", Side::Against),
    ("\u{2015}", Side::Against),
    ("👎🏻", Side::Against),
    ("👎🏼", Side::Against),
    ("👎🏽", Side::Against),
    ("👎🏾", Side::Against),
    ("👎🏿", Side::Against),
    ("👎", Side::Against),
    ("", Side::For),
];

const ABSTAIN_SYMBOL: &str = "\\";

fn side_of(symbol: &str) -> Side {
    VOTE_SYMBOLS
        .iter()
        .find(|(candidate, _)| *candidate == symbol)
        .map_or(Side::For, |(_, side)| *side)
}

/// `(?P<vote>...)(?P<option>.*)`; `symbol_modifier` is `?` when the vote
/// symbol may be omitted.
fn vote_pattern(symbol_modifier: &str) -> String {
    let symbols = VOTE_SYMBOLS
        .iter()
        .map(|(symbol, _)| regex::escape(symbol))
        .collect::<Vec<_>>()
        .join("|");
    format!(r"^((?P<vote>({symbols}\\){symbol_modifier})(?P<option>.*))$")
}

#[derive(Debug, Clone, Deserialize)]
struct VoteConfig {
    options_separator: String,
    username_separator: String,
    boolean_shortform: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Section {
    #[serde(rename = "for", default)]
    for_: Vec<String>,
    #[serde(default)]
    against: Vec<String>,
}

impl Section {
    fn side(&self, side: Side) -> &Vec<String> {
        match side {
            Side::For => &self.for_,
            Side::Against => &self.against,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut Vec<String> {
        match side {
            Side::For => &mut self.for_,
            Side::Against => &mut self.against,
        }
    }

    fn remove(&mut self, voter: &str) {
        self.for_.retain(|v| v != voter);
        self.against.retain(|v| v != voter);
    }
}

type Votes = BTreeMap<String, Section>;

#[derive(Debug, Clone)]
struct Ballot {
    voter: String,
    section: String,
    side: Side,
}

impl Ballot {
    fn abstain(voter: &str) -> Self {
        Self {
            voter: voter.to_string(),
            section: ABSTAIN_OPTION.to_string(),
            side: Side::For,
        }
    }
}

/// A vote that names no valid option; the message is shown to explicit
/// voters only.
#[derive(Debug)]
struct InvalidOption(String);

impl fmt::Display for InvalidOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A basic proposal voting plugin.
#[derive(Debug, Default, Clone, Copy)]
pub struct Vote;

impl Vote {
    async fn startvote(self: Arc<Self>, ctx: PluginContext, line: Arc<Line>, args: RouteArgs) -> HandlerResult {
        let config: VoteConfig = ctx.config_as()?;
        if is_running(&ctx).await? {
            return Ok(Some(Reply::from(format!(
                "{}: There’s already a vote going on. Use the “endvote” command to end it before starting a new one.",
                line.user
            ))));
        }

        let mut options: BTreeSet<String> = args
            .capture("options")
            .map(|options| {
                options
                    .split(config.options_separator.as_str())
                    .map(str::trim)
                    .filter(|option| !option.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if options.is_empty() {
            options.insert(DEFAULT_VOTE_OPTION.to_string());
        }
        options.insert(ABSTAIN_OPTION.to_string());

        let votes: Votes = options
            .iter()
            .map(|option| (option.clone(), Section::default()))
            .collect();
        let name = args.capture("name");

        ctx.store(NAME_KEY, serde_json::to_string(&name)?).await?;
        ctx.store(OPTIONS_KEY, serde_json::to_string(&options)?).await?;
        ctx.store(VOTES_KEY, serde_json::to_string(&votes)?).await?;
        set_changed(&ctx, false).await?;
        debug!(channel = %ctx.channel().name, ?name, ?options, "Vote started");

        Ok(Some(Reply::from(match name {
            Some(name) => format!("Voting has started for proposal “{name}”."),
            None => VOTING_STARTED.to_string(),
        })))
    }

    async fn endvote(self: Arc<Self>, ctx: PluginContext, _line: Arc<Line>, _args: RouteArgs) -> HandlerResult {
        if !is_running(&ctx).await? {
            return Ok(Some(Reply::from(NO_VOTE_STARTED)));
        }
        let config: VoteConfig = ctx.config_as()?;

        let name = load::<Option<String>>(&ctx, NAME_KEY).await?.flatten();
        let mut reply = match name {
            Some(name) => format!("Voting has ended for proposal “{name}”."),
            None => VOTING_ENDED.to_string(),
        };
        if load::<bool>(&ctx, CHANGES_KEY).await?.unwrap_or(false) {
            reply.push('\n');
            reply.push_str(&print_votes(&load_votes(&ctx).await?, &config));
        }

        for key in [NAME_KEY, OPTIONS_KEY, VOTES_KEY, CHANGES_KEY] {
            ctx.delete(key).await?;
        }
        Ok(Some(Reply::from(reply)))
    }

    async fn countvotes(self: Arc<Self>, ctx: PluginContext, _line: Arc<Line>, _args: RouteArgs) -> HandlerResult {
        if !is_running(&ctx).await? {
            return Ok(Some(Reply::from(NO_VOTE_STARTED)));
        }
        let config: VoteConfig = ctx.config_as()?;
        set_changed(&ctx, false).await?;
        Ok(Some(Reply::from(print_votes(&load_votes(&ctx).await?, &config))))
    }

    async fn vote(self: Arc<Self>, ctx: PluginContext, line: Arc<Line>, args: RouteArgs) -> HandlerResult {
        if !is_running(&ctx).await? {
            return Ok(Some(Reply::from(NO_VOTE_STARTED)));
        }
        let config: VoteConfig = ctx.config_as()?;
        let symbol = args.capture_or_empty("vote");
        let option = args.capture_or_empty("option");

        match parse_vote(&ctx, &config, &line.user, symbol, option).await? {
            Ok(ballot) => {
                if add_vote(&ctx, ballot).await? {
                    set_changed(&ctx, true).await?;
                }
                Ok(None)
            }
            Err(invalid) => Ok(Some(Reply::from(invalid.to_string()))),
        }
    }

    /// `+option` and friends without the command. Silent unless the vote
    /// is valid: ordinary chat starts with `-` often enough.
    async fn implicit_vote(self: Arc<Self>, ctx: PluginContext, line: Arc<Line>, args: RouteArgs) -> HandlerResult {
        if !is_running(&ctx).await? {
            return Ok(None);
        }
        let config: VoteConfig = ctx.config_as()?;
        let symbol = args.capture_or_empty("vote");
        let option = args.capture_or_empty("option");

        if let Ok(ballot) = parse_vote(&ctx, &config, &line.user, symbol, option).await?
            && add_vote(&ctx, ballot).await?
        {
            set_changed(&ctx, true).await?;
        }
        Ok(None)
    }

    async fn abstain(self: Arc<Self>, ctx: PluginContext, line: Arc<Line>, _args: RouteArgs) -> HandlerResult {
        if !is_running(&ctx).await? {
            return Ok(Some(Reply::from(NO_VOTE_STARTED)));
        }
        set_changed(&ctx, true).await?;
        add_vote(&ctx, Ballot::abstain(&line.user)).await?;
        Ok(None)
    }

    async fn cancelvotes(self: Arc<Self>, ctx: PluginContext, line: Arc<Line>, _args: RouteArgs) -> HandlerResult {
        if !is_running(&ctx).await? {
            return Ok(Some(Reply::from(NO_VOTE_STARTED)));
        }
        set_changed(&ctx, true).await?;
        let mut votes = load_votes(&ctx).await?;
        remove_all_votes(&mut votes, &line.user);
        ctx.store(VOTES_KEY, serde_json::to_string(&votes)?).await?;
        Ok(None)
    }
}

impl Plugin for Vote {
    fn slug(&self) -> &'static str {
        module_slug(module_path!())
    }

    fn routes(self: Arc<Self>) -> Vec<Route> {
        vec![
            listens_to_regex_command(
                "startvote",
                r"(?P<name>[^\[\]]+?)?\s*(\[(?P<options>.*)\])?\s*$",
            )
            .bind("startvote", &self, Self::startvote),
            listens_to_command("endvote").bind("endvote", &self, Self::endvote),
            listens_to_command("countvotes").bind("countvotes", &self, Self::countvotes),
            listens_to_regex_command("vote", vote_pattern("?")).bind("vote", &self, Self::vote),
            listens_to_all(vote_pattern("")).bind("implicit_vote", &self, Self::implicit_vote),
            listens_to_command("abstain").bind("abstain", &self, Self::abstain),
            listens_to_command("cancelvotes").bind("cancelvotes", &self, Self::cancelvotes),
        ]
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::new("options_separator")
                .default(",")
                .help("Separator to use when starting a vote with custom options"),
            ConfigField::new("username_separator")
                .default(",")
                .help("Separator between usernames when printing out votes"),
            ConfigField::new("boolean_shortform")
                .default("1")
                .help("The short option that voters can use in boolean votes"),
        ]
    }

    fn description(&self) -> Option<&'static str> {
        Some(
            "Start a vote with `startvote [name] [opt1, opt2]`, vote with `+opt`, `-opt` or `\\1`, \
             then `countvotes` and `endvote`. `abstain` and `cancelvotes` do what they say.",
        )
    }
}

async fn load<T: serde::de::DeserializeOwned>(ctx: &PluginContext, key: &str) -> anyhow::Result<Option<T>> {
    match ctx.retrieve(key).await? {
        Some(raw) if !raw.is_empty() => Ok(Some(serde_json::from_str(&raw)?)),
        _ => Ok(None),
    }
}

async fn load_votes(ctx: &PluginContext) -> anyhow::Result<Votes> {
    Ok(load(ctx, VOTES_KEY).await?.unwrap_or_default())
}

async fn is_running(ctx: &PluginContext) -> anyhow::Result<bool> {
    Ok(ctx
        .retrieve(VOTES_KEY)
        .await?
        .is_some_and(|votes| !votes.is_empty()))
}

async fn set_changed(ctx: &PluginContext, changed: bool) -> anyhow::Result<()> {
    ctx.store(CHANGES_KEY, serde_json::to_string(&changed)?).await?;
    Ok(())
}

/// Options voters may name; the boolean default appears as the shortform.
async fn valid_options(ctx: &PluginContext, config: &VoteConfig) -> anyhow::Result<Vec<String>> {
    let options: Vec<String> = load(ctx, OPTIONS_KEY).await?.unwrap_or_default();
    Ok(options
        .into_iter()
        .map(|option| {
            if option == DEFAULT_VOTE_OPTION {
                config.boolean_shortform.clone()
            } else {
                option
            }
        })
        .collect())
}

async fn parse_vote(
    ctx: &PluginContext,
    config: &VoteConfig,
    voter: &str,
    symbol: &str,
    option: &str,
) -> anyhow::Result<Result<Ballot, InvalidOption>> {
    let shortform = config.boolean_shortform.as_str();

    if symbol == ABSTAIN_SYMBOL {
        return Ok(if option == shortform || option == ABSTAIN_WORD {
            Ok(Ballot::abstain(voter))
        } else {
            Err(InvalidOption(format!(
                "The only valid way to abstain is using \\{shortform}."
            )))
        });
    }

    let option = if option.trim().is_empty() { shortform } else { option };
    let options = valid_options(ctx, config).await?;
    let Some(matched) = longest_matching_option(option, &options) else {
        return Ok(Err(InvalidOption(format!("“{option}” is not a valid option."))));
    };

    let section = if matched == shortform {
        DEFAULT_VOTE_OPTION.to_string()
    } else {
        matched.trim().to_string()
    };
    Ok(Ok(Ballot {
        voter: voter.to_string(),
        section,
        side: side_of(symbol),
    }))
}

/// The longest option that equals the input or is followed in it by a
/// space, so `oreo` does not count as a vote for `o`.
fn longest_matching_option<'a>(input: &str, options: &'a [String]) -> Option<&'a str> {
    let input = input.trim().replace('\t', " ");
    let mut longest: Option<&str> = None;
    for option in options {
        let trimmed = option.trim();
        let matches = input == trimmed || input.starts_with(&format!("{trimmed} "));
        let longer = longest.is_none_or(|best| option.chars().count() > best.chars().count());
        if matches && longer {
            longest = Some(option);
        }
    }
    longest
}

/// Records a ballot. Returns `false` if the voter had already cast exactly
/// this vote.
async fn add_vote(ctx: &PluginContext, ballot: Ballot) -> anyhow::Result<bool> {
    let Ballot {
        voter,
        section,
        side,
    } = ballot;
    let mut votes = load_votes(ctx).await?;

    let current = votes.entry(section.clone()).or_default();
    if current.side(side).contains(&voter) {
        return Ok(false);
    }
    current.side_mut(side.opposing()).retain(|v| *v != voter);

    if section == ABSTAIN_OPTION {
        remove_all_votes(&mut votes, &voter);
    }
    if let Some(abstained) = votes.get_mut(ABSTAIN_OPTION) {
        abstained.for_.retain(|v| *v != voter);
    }
    votes
        .entry(section)
        .or_default()
        .side_mut(side)
        .push(voter.trim().to_string());

    ctx.store(VOTES_KEY, serde_json::to_string(&votes)?).await?;
    Ok(true)
}

fn remove_all_votes(votes: &mut Votes, voter: &str) {
    for section in votes.values_mut() {
        section.remove(voter);
    }
}

/// Sections in name order, abstentions last.
fn print_votes(votes: &Votes, config: &VoteConfig) -> String {
    let separator = format!("{} ", config.username_separator);
    votes
        .iter()
        .filter(|(name, _)| name.as_str() != ABSTAIN_OPTION)
        .chain(votes.get_key_value(ABSTAIN_OPTION))
        .map(|(name, section)| section_repr(name, section, &separator))
        .collect::<Vec<_>>()
        .join(" ")
}

fn section_repr(name: &str, section: &Section, separator: &str) -> String {
    let Section { for_, against } = section;
    match name {
        DEFAULT_VOTE_OPTION => format!(
            "[+{}: {}] [-{}: {}]",
            for_.len(),
            for_.join(separator),
            against.len(),
            against.join(separator)
        ),
        ABSTAIN_OPTION => format!("[\\{}: {}]", for_.len(), for_.join(separator)),
        _ => {
            let mut repr = format!("[{name}(+{}, -{}): ", for_.len(), against.len());
            repr.push_str(&for_.join(separator));
            if !for_.is_empty() && !against.is_empty() {
                repr.push_str("; ");
            }
            let against: Vec<String> = against.iter().map(|voter| format!("-{voter}")).collect();
            repr.push_str(&against.join(separator));
            repr.push(']');
            repr
        }
    }
}
