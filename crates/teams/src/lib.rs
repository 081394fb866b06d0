//! Team/emoji registry
//!
//! Static mapping from team shortcode/name to the custom emoji used on
//! announcement messages. Reaction events carry only the numeric emoji id,
//! so the id is extracted from the `<:CODE:id>` markdown once per lookup.

use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Team {
    pub shortcode: &'static str,
    pub name: &'static str,
    pub emoji_markdown: &'static str,
}

pub const TEAMS: &[Team] = &[
    Team { shortcode: "100", name: "100 Thieves",                    emoji_markdown: "<:100T:1289420045323341905>" },
    Team { shortcode: "BLG", name: "BILIBILI GAMING DREAMSMART",     emoji_markdown: "<:BLG:1289420061366292512>" },
    Team { shortcode: "DK",  name: "Dplus KIA",                      emoji_markdown: "<:DK:1289420072217088061>" },
    Team { shortcode: "FLY", name: "FlyQuest",                       emoji_markdown: "<:FLY:1289420083533447319>" },
    Team { shortcode: "FNC", name: "Fnatic",                         emoji_markdown: "<:FNC:1289420093792587796>" },
    Team { shortcode: "G2",  name: "G2 Esports",                     emoji_markdown: "<:G2:1289420105675046963>" },
    Team { shortcode: "GAM", name: "GAM Esports",                    emoji_markdown: "<:GAM:1289420139355176971>" },
    Team { shortcode: "GEN", name: "Gen.G",                          emoji_markdown: "<:GEN:1289420151845949460>" },
    Team { shortcode: "HLE", name: "Hanwha Life Esports",            emoji_markdown: "<:HLE:1289420164374331414>" },
    Team { shortcode: "LNG", name: "Suzhou LNG Ninebot Esports",     emoji_markdown: "<:LNG:1289420177053585478>" },
    Team { shortcode: "MDK", name: "MAD Lions KOI",                  emoji_markdown: "<:MDK:1289420190299459584>" },
    Team { shortcode: "PNG", name: "paIN Gaming",                    emoji_markdown: "<:PNG:1289420206690664581>" },
    Team { shortcode: "PSG", name: "PSG Talon",                      emoji_markdown: "<:PSG:1289420219802189865>" },
    Team { shortcode: "R7",  name: "Movistar R7",                    emoji_markdown: "<:R7:1289420235392421949>" },
    Team { shortcode: "SHG", name: "Fukuoka SoftBank HAWKS gaming",  emoji_markdown: "<:SHG:1289420247606235166>" },
    Team { shortcode: "T1",  name: "T1",                             emoji_markdown: "<:T1:1289420265608056852>" },
    Team { shortcode: "TES", name: "Top Esports",                    emoji_markdown: "<:TES:1289420280493772800>" },
    Team { shortcode: "TL",  name: "Team Liquid",                    emoji_markdown: "<:TL:1289420293126754357>" },
    Team { shortcode: "VKE", name: "Vikings Esports",                emoji_markdown: "<:VKE:1289420306061987874>" },
    Team { shortcode: "WBG", name: "WeiboGaming TapTap",             emoji_markdown: "<:WBG:1289420318024142860>" },
];

pub fn get_team_by_shortcode(shortcode: &str) -> Option<&'static Team> {
    TEAMS.iter().find(|t| t.shortcode == shortcode)
}

pub fn get_team_by_name(name: &str) -> Option<&'static Team> {
    TEAMS.iter().find(|t| t.name == name)
}

/// Emoji markdown for a team, looked up by shortcode or full name.
pub fn get_emoji_markdown(identifier: &str) -> Option<&'static str> {
    let team = TEAMS
        .iter()
        .find(|t| t.shortcode == identifier || t.name == identifier);
    if team.is_none() {
        warn!("No emoji registered for {identifier}");
    }
    team.map(|t| t.emoji_markdown)
}

/// Numeric emoji id from `<:CODE:123456>` markdown.
pub fn emoji_id(markdown: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r":(\d+)>").unwrap());
    re.captures(markdown)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

// ── Esport metadata ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct EsportInfo {
    pub key: &'static str,
    pub full_name: &'static str,
    pub shortcode: &'static str,
    pub markdown: &'static str,
}

pub const ESPORTS: &[EsportInfo] = &[
    EsportInfo { key: "lol",      full_name: "League of Legends", shortcode: "LoL", markdown: "<:LOL:1293232196030562335>" },
    EsportInfo { key: "valorant", full_name: "Valorant",          shortcode: "VCT", markdown: "<:VCT:1293232162446905446>" },
];

pub fn get_esport(key: &str) -> Option<&'static EsportInfo> {
    ESPORTS.iter().find(|e| e.key == key)
}

// ── Name normalization ────────────────────────────────────────────────────────

/// Lowercased, diacritic-free, alphanumeric-word form of a team name.
/// Upstream feeds spell the same team differently ("Movistar R7" vs
/// "MOVISTAR R7"); correlation keys go through this.
pub fn normalize_name(name: &str) -> String {
    name.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn match_key(team1: &str, team2: &str) -> String {
    format!("{}_vs_{}", normalize_name(team1), normalize_name(team2))
}
