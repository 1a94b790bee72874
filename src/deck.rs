use crate::card::CardRecord;
use crate::drawable::{Drawable, ImageProvider};
use crate::error::DeckError;
use crate::overlay::make_overlay;
use crate::types::Color;
use std::collections::HashMap;
use std::path::Path;

const ACTION_TOP: &str = "Kiam vi ludus tiun ĉi karton, faru tion, kio estas skribita, \
                          kaj poste metu ĝin sur la forĵetstaplon.";
const KEEPER_TOP: &str = "Kiam vi ludas tiun ĉi karton, metu ĝin sur la tablon, antaŭ vi, \
                          montrante la facon.";
const RULE_TOP: &str = "Kiam vi ludus tiun ĉi karton, metu ĝin en la mezo de la tablo. \
                        Forigu regulojn, kiujn ĉi tiu karto kontraŭas. La regulo tuj validas.";
const GOAL_TOP: &str = "Kiam vi ludas ĉi tiun karton, metu ĝin en la mezo de la tablo, \
                        montrante la facon. Forĵetu iun ajn antaŭan Celon.";

/// Side bar colors of the card families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    NewRule,
    BasicRules,
    Action,
    Keeper,
    Goal,
}

impl Palette {
    pub fn color(self) -> Color {
        match self {
            Palette::NewRule => Color::from_rgb8(244, 217, 0),
            Palette::BasicRules => Color::from_rgb8(255, 97, 27),
            Palette::Action => Color::from_rgb8(35, 184, 220),
            Palette::Keeper => Color::from_rgb8(0, 246, 64),
            Palette::Goal => Color::from_rgb8(251, 48, 110),
        }
    }
}

/// Icons shared by each card family.
#[derive(Debug, Clone)]
pub struct DeckAssets {
    pub basic_rules_icon: Drawable,
    pub action_icon: Drawable,
    pub keeper_icon: Drawable,
    pub goal_icon: Drawable,
    pub basic_rules_image: Drawable,
}

impl DeckAssets {
    pub fn load(provider: &mut ImageProvider) -> Result<Self, DeckError> {
        Ok(Self {
            basic_rules_icon: provider.resolve("basic-rules.svg")?,
            action_icon: provider.resolve("action.svg")?,
            keeper_icon: provider.resolve("keeper.svg")?,
            goal_icon: provider.resolve("goal.svg")?,
            basic_rules_image: provider.resolve("scary-hand.svg")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Keeper {
    pub name: String,
    pub image: Drawable,
}

/// Keepers by short name: the last word of their template line, lowercased.
#[derive(Debug, Clone, Default)]
pub struct KeeperRegistry {
    keepers: HashMap<String, Keeper>,
}

impl KeeperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, keeper: Keeper) {
        self.keepers.insert(key.into(), keeper);
    }

    pub fn get(&self, key: &str) -> Option<&Keeper> {
        self.keepers.get(key)
    }

    pub fn len(&self) -> usize {
        self.keepers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keepers.is_empty()
    }

    fn lookup(&self, reference: &str) -> Result<(&Keeper, bool), DeckError> {
        let (inverted, key) = match reference.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, reference),
        };
        self.keepers
            .get(key)
            .map(|keeper| (keeper, inverted))
            .ok_or_else(|| DeckError::unresolved("keeper", key))
    }
}

/// A keeper line: `image:name`, split at the last colon.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeeperLine<'a> {
    image: &'a str,
    name: &'a str,
    key: Option<String>,
}

impl<'a> KeeperLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let (image, name) = line.rsplit_once(':')?;
        if image.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            image,
            name,
            key: short_name(line),
        })
    }
}

/// A rule line: `image:name:description`, split at the last two colons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RuleLine<'a> {
    image: &'a str,
    name: &'a str,
    description: &'a str,
}

impl<'a> RuleLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let (head, description) = line.rsplit_once(':')?;
        let (image, name) = head.rsplit_once(':')?;
        if [image, name, description].iter().any(|part| part.is_empty()) {
            return None;
        }
        Some(Self {
            image,
            name,
            description,
        })
    }
}

/// A goal line: `name:a:b[:note]`, or `@name:image:note` for a goal with its
/// own picture. The note keeps any further colons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GoalLine<'a> {
    Keepers {
        name: &'a str,
        first: &'a str,
        second: &'a str,
        note: Option<&'a str>,
    },
    Pictured {
        name: &'a str,
        image: &'a str,
        note: &'a str,
    },
}

impl<'a> GoalLine<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let non_empty = |field: Option<&'a str>| field.filter(|f| !f.is_empty());
        if let Some(rest) = line.strip_prefix('@') {
            let mut fields = rest.splitn(3, ':');
            return Some(GoalLine::Pictured {
                name: non_empty(fields.next())?,
                image: non_empty(fields.next())?,
                note: non_empty(fields.next())?,
            });
        }
        let mut fields = line.splitn(4, ':');
        Some(GoalLine::Keepers {
            name: non_empty(fields.next())?,
            first: non_empty(fields.next())?,
            second: non_empty(fields.next())?,
            note: non_empty(fields.next()),
        })
    }
}

/// The trailing run of word characters, lowercased.
fn short_name(line: &str) -> Option<String> {
    let start = line
        .char_indices()
        .rev()
        .take_while(|(_, ch)| ch.is_alphanumeric() || *ch == '_')
        .last()
        .map(|(index, _)| index)?;
    Some(line[start..].to_lowercase())
}

pub fn basic_rules_card(assets: &DeckAssets) -> CardRecord {
    CardRecord::builder()
        .color(Palette::NewRule.color())
        .side_highlight(Palette::BasicRules.color())
        .title("Prenu 1, Ludu 1")
        .card_type("Bazaj Reguloj")
        .icon(assets.basic_rules_icon.clone())
        .top_image(assets.basic_rules_image.clone())
        .top_paragraph(
            "Por komenci, miksi la kartaron kaj disdoni po 3 kartojn al ĉiu ludanto. \
             Metu ĉi tiun karton en la mezo de la tablo.",
        )
        .bottom_paragraph(
            "Je via vico:\nPrenu 1 karton.\nLudu 1 karton.\n\n\
             Ĉi tiu karto restu sur la tablo eĉ se novaj reguloj anstataŭigas la bazajn regulojn.",
        )
        .build()
}

/// Parses `actions.txt`: a `:Title` line opens a card and the non-empty lines
/// after it form the description.
pub fn parse_actions(text: &str, assets: &DeckAssets) -> Vec<CardRecord> {
    let mut cards = Vec::new();
    let mut current: Option<(String, String)> = None;

    // A bare `:` opens an untitled block; it and its text are dropped.
    let finish = |cards: &mut Vec<CardRecord>, title: String, description: String| {
        if title.trim().is_empty() {
            log::debug!("skipping untitled action: {description:?}");
            return;
        }
        cards.push(
            CardRecord::builder()
                .color(Palette::Action.color())
                .title(title)
                .card_type("Ago")
                .icon(assets.action_icon.clone())
                .top_paragraph(ACTION_TOP)
                .bottom_paragraph(description)
                .build(),
        );
    };

    for line in text.lines() {
        let line = line.trim_end();
        if let Some(title) = line.strip_prefix(':') {
            if let Some((title, description)) = current.take() {
                finish(&mut cards, title, description);
            }
            current = Some((title.to_string(), String::new()));
        } else if let Some((_, description)) = current.as_mut() {
            if line.is_empty() {
                continue;
            }
            if !description.is_empty() {
                description.push(' ');
            }
            description.push_str(line);
        } else if !line.is_empty() {
            log::debug!("skipping action line before the first title: {line:?}");
        }
    }
    if let Some((title, description)) = current {
        finish(&mut cards, title, description);
    }
    cards
}

/// Parses `keepers.txt` (`image:name` per line), resolving each image and
/// recording the keeper under its short name.
pub fn parse_keepers(
    text: &str,
    assets: &DeckAssets,
    provider: &mut ImageProvider,
    registry: &mut KeeperRegistry,
) -> Result<Vec<CardRecord>, DeckError> {
    let mut cards = Vec::new();

    for line in text.lines() {
        let line = line.trim_end();
        let Some(parsed) = KeeperLine::parse(line) else {
            if !line.is_empty() {
                log::debug!("skipping malformed keeper line: {line:?}");
            }
            continue;
        };
        let image = provider.resolve(parsed.image)?;

        match parsed.key {
            Some(key) => registry.insert(
                key,
                Keeper {
                    name: parsed.name.to_string(),
                    image: image.clone(),
                },
            ),
            None => log::debug!(
                "keeper {:?} has no short name and cannot be referenced",
                parsed.name
            ),
        }

        cards.push(
            CardRecord::builder()
                .card_type("Tenaĵo")
                .title(parsed.name)
                .icon(assets.keeper_icon.clone())
                .color(Palette::Keeper.color())
                .top_paragraph(KEEPER_TOP)
                .bottom_image(image)
                .build(),
        );
    }
    Ok(cards)
}

/// Parses `rules.txt` (`image:name:description` per line).
pub fn parse_rules(
    text: &str,
    assets: &DeckAssets,
    provider: &mut ImageProvider,
) -> Result<Vec<CardRecord>, DeckError> {
    let mut cards = Vec::new();

    for line in text.lines() {
        let line = line.trim_end();
        let Some(parsed) = RuleLine::parse(line) else {
            if !line.is_empty() {
                log::debug!("skipping malformed rule line: {line:?}");
            }
            continue;
        };
        let image = provider.resolve(parsed.image)?;
        cards.push(
            CardRecord::builder()
                .card_type("Regulo")
                .title(parsed.name)
                .icon(assets.basic_rules_icon.clone())
                .color(Palette::NewRule.color())
                .top_paragraph(RULE_TOP)
                .bottom_image(image)
                .bottom_paragraph(parsed.description)
                .build(),
        );
    }
    Ok(cards)
}

/// Parses `goals.txt`. `name:a:b[:note]` names two keepers, either of which
/// may be prefixed with `!` to require its absence; `@name:image:note` is a
/// goal with its own picture.
pub fn parse_goals(
    text: &str,
    assets: &DeckAssets,
    provider: &mut ImageProvider,
    keepers: &KeeperRegistry,
) -> Result<Vec<CardRecord>, DeckError> {
    let mut cards = Vec::new();

    for line in text.lines() {
        let line = line.trim_end();
        let Some(parsed) = GoalLine::parse(line) else {
            if !line.is_empty() {
                log::debug!("skipping malformed goal line: {line:?}");
            }
            continue;
        };

        let (name, images, note) = match parsed {
            GoalLine::Pictured { name, image, note } => {
                (name, vec![provider.resolve(image)?], note.to_string())
            }
            GoalLine::Keepers {
                name,
                first,
                second,
                note,
            } => {
                let pair = [keepers.lookup(first)?, keepers.lookup(second)?];
                let note = match note {
                    Some(note) => note.to_string(),
                    None => default_goal_note(pair.iter().map(|(keeper, _)| keeper.name.as_str())),
                };
                let images = pair
                    .iter()
                    .map(|(keeper, inverted)| {
                        if *inverted {
                            make_overlay(keeper.image.clone())
                        } else {
                            keeper.image.clone()
                        }
                    })
                    .collect::<Vec<_>>();
                (name, images, note)
            }
        };

        cards.push(
            CardRecord::builder()
                .card_type("Celo")
                .title(name)
                .icon(assets.goal_icon.clone())
                .color(Palette::Goal.color())
                .top_paragraph(GOAL_TOP)
                .bottom_paragraph(note)
                .bottom_images(images)
                .build(),
        );
    }
    Ok(cards)
}

fn default_goal_note<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let parts: Vec<String> = names.map(|name| format!("kaj {name}n")).collect();
    format!("Ludanto venkas, kiu havas {} sur la tablo.", parts.join(" "))
}

/// The ordered card list fed to both output passes.
#[derive(Debug, Clone, Default)]
pub struct CardDeck {
    pub cards: Vec<CardRecord>,
}

impl CardDeck {
    pub fn new(cards: Vec<CardRecord>) -> Self {
        Self { cards }
    }

    /// Reads the four template files from `dir`, resolving images through
    /// `provider`. Cards come out as basic rules, actions, keepers, goals,
    /// rules.
    pub fn load(dir: &Path, provider: &mut ImageProvider) -> Result<Self, DeckError> {
        let read = |file: &str| -> Result<String, DeckError> {
            std::fs::read_to_string(dir.join(file)).map_err(|err| match err.kind() {
                std::io::ErrorKind::NotFound => DeckError::unresolved("template", file),
                _ => DeckError::Io(err),
            })
        };
        let actions = read("actions.txt")?;
        let keepers = read("keepers.txt")?;
        let goals = read("goals.txt")?;
        let rules = read("rules.txt")?;

        let assets = DeckAssets::load(provider)?;
        let mut registry = KeeperRegistry::new();
        let mut cards = vec![basic_rules_card(&assets)];
        cards.extend(parse_actions(&actions, &assets));
        cards.extend(parse_keepers(&keepers, &assets, provider, &mut registry)?);
        cards.extend(parse_goals(&goals, &assets, provider, &registry)?);
        cards.extend(parse_rules(&rules, &assets, provider)?);

        log::info!(
            "loaded {} cards ({} keepers, {} images) from {}",
            cards.len(),
            registry.len(),
            provider.len(),
            dir.display()
        );
        Ok(Self { cards })
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CardRecord> {
        self.cards.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SQUARE: &str =
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"><rect width="10" height="10"/></svg>"#;

    fn image_dir(names: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let family = ["basic-rules.svg", "action.svg", "keeper.svg", "goal.svg", "scary-hand.svg"];
        for name in family.iter().chain(names) {
            fs::write(dir.path().join(name), SQUARE).unwrap();
        }
        dir
    }

    fn setup(names: &[&str]) -> (TempDir, ImageProvider, DeckAssets) {
        let dir = image_dir(names);
        let mut provider = ImageProvider::new(dir.path());
        let assets = DeckAssets::load(&mut provider).unwrap();
        (dir, provider, assets)
    }

    #[test]
    fn goal_lines_parse_both_shapes() {
        assert_eq!(
            GoalLine::parse("Matenmanĝo:pano:!lakto"),
            Some(GoalLine::Keepers {
                name: "Matenmanĝo",
                first: "pano",
                second: "!lakto",
                note: None,
            })
        );
        assert_eq!(
            GoalLine::parse("Celo:a:b:Noto: kun dupunkto"),
            Some(GoalLine::Keepers {
                name: "Celo",
                first: "a",
                second: "b",
                note: Some("Noto: kun dupunkto"),
            })
        );
        assert_eq!(
            GoalLine::parse("@Dek:dek.svg:Havu dek: ne naŭ."),
            Some(GoalLine::Pictured {
                name: "Dek",
                image: "dek.svg",
                note: "Havu dek: ne naŭ.",
            })
        );
        assert_eq!(GoalLine::parse("Celo:pano"), None);
        assert_eq!(GoalLine::parse("Celo::pano"), None);
        assert_eq!(GoalLine::parse("@Dek:dek.svg"), None);
    }

    #[test]
    fn keeper_short_name_is_the_trailing_word() {
        let parsed = KeeperLine::parse("bildoj/pano.svg:Freŝa Pano").unwrap();
        assert_eq!(parsed.image, "bildoj/pano.svg");
        assert_eq!(parsed.name, "Freŝa Pano");
        assert_eq!(parsed.key.as_deref(), Some("pano"));
        assert_eq!(short_name("la ĉokolado"), Some("ĉokolado".to_string()));
        assert_eq!(short_name("Kio?"), None);
        assert_eq!(KeeperLine::parse("pano.svg:"), None);
    }

    #[test]
    fn rule_lines_need_three_fields() {
        assert_eq!(
            RuleLine::parse("du.svg:Prenu 2:Prenu du."),
            Some(RuleLine {
                image: "du.svg",
                name: "Prenu 2",
                description: "Prenu du.",
            })
        );
        assert_eq!(RuleLine::parse("du.svg:Prenu 2"), None);
        assert_eq!(RuleLine::parse(":Prenu 2:Prenu du."), None);
    }

    #[test]
    fn palette_matches_the_byte_colors() {
        assert_eq!(Palette::Action.color(), Color::from_rgb8(35, 184, 220));
        assert!((Palette::NewRule.color().r - 244.0 / 255.0).abs() < 1e-6);
        assert_eq!(Palette::Goal.color().b, 110.0 / 255.0);
    }

    #[test]
    fn basic_rules_card_uses_both_rule_colors() {
        let (_dir, _provider, assets) = setup(&[]);
        let card = basic_rules_card(&assets);
        assert_eq!(card.title(), Some("Prenu 1, Ludu 1"));
        assert_eq!(card.card_type(), Some("Bazaj Reguloj"));
        assert_eq!(card.color(), Some(Palette::NewRule.color()));
        assert_eq!(card.side_highlight(), Some(Palette::BasicRules.color()));
        assert!(card.top_image().is_some());
        assert!(card.bottom_paragraph().unwrap().starts_with("Je via vico:\n"));
    }

    #[test]
    fn actions_join_description_lines() {
        let (_dir, _provider, assets) = setup(&[]);
        let text = "ignored preamble\n:Prenu 2\nPrenu du kartojn\n\n  \nel la stako.\n:Ludu 2\nLudu du.\n";
        let cards = parse_actions(text, &assets);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].title(), Some("Prenu 2"));
        assert_eq!(cards[0].bottom_paragraph(), Some("Prenu du kartojn el la stako."));
        assert_eq!(cards[0].card_type(), Some("Ago"));
        assert_eq!(cards[0].top_paragraph(), Some(ACTION_TOP));
        assert_eq!(cards[1].bottom_paragraph(), Some("Ludu du."));
        assert_eq!(cards[1].color(), Some(Palette::Action.color()));
    }

    #[test]
    fn action_without_description_has_empty_paragraph() {
        let (_dir, _provider, assets) = setup(&[]);
        let cards = parse_actions(":Sola\n", &assets);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].bottom_paragraph(), Some(""));
    }

    #[test]
    fn untitled_action_is_dropped_with_its_text() {
        let (_dir, _provider, assets) = setup(&[]);
        let text = ":Ludu 2\nLudu du.\n:\nForgesita teksto.\n:Prenu 3\nPrenu tri.\n";
        let cards = parse_actions(text, &assets);
        let titles: Vec<_> = cards.iter().map(|c| c.title()).collect();
        assert_eq!(titles, [Some("Ludu 2"), Some("Prenu 3")]);
        assert_eq!(cards[0].bottom_paragraph(), Some("Ludu du."));
        assert_eq!(cards[1].bottom_paragraph(), Some("Prenu tri."));
    }

    #[test]
    fn keepers_register_by_last_word() {
        let (_dir, mut provider, assets) = setup(&["pano.svg", "luno.svg", "suno.svg"]);
        let mut registry = KeeperRegistry::new();
        let text = "pano.svg:Freŝa Pano\nnot a keeper line\nluno.svg:La Luno\nsuno.svg:Alia Luno\n";
        let cards = parse_keepers(text, &assets, &mut provider, &mut registry).unwrap();
        assert_eq!(cards.len(), 3);
        assert_eq!(cards[0].title(), Some("Freŝa Pano"));
        assert_eq!(cards[0].card_type(), Some("Tenaĵo"));
        assert_eq!(cards[0].bottom_images().map(|i| i.len()), Some(1));
        assert_eq!(registry.get("pano").map(|k| k.name.as_str()), Some("Freŝa Pano"));
        // The later line wins the shared key.
        assert_eq!(registry.get("luno").map(|k| k.name.as_str()), Some("Alia Luno"));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn keeper_with_missing_image_is_an_error() {
        let (_dir, mut provider, assets) = setup(&[]);
        let mut registry = KeeperRegistry::new();
        let err = parse_keepers("nenio.svg:Nenio\n", &assets, &mut provider, &mut registry).unwrap_err();
        assert!(matches!(err, DeckError::UnresolvedReference { kind: "image", .. }));
    }

    #[test]
    fn rules_take_image_name_and_description() {
        let (_dir, mut provider, assets) = setup(&["du.svg"]);
        let text = "du.svg:Prenu 2:Prenu du kartojn.\nmalbona linio\n";
        let cards = parse_rules(text, &assets, &mut provider).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title(), Some("Prenu 2"));
        assert_eq!(cards[0].bottom_paragraph(), Some("Prenu du kartojn."));
        assert_eq!(cards[0].card_type(), Some("Regulo"));
        assert_eq!(cards[0].top_paragraph(), Some(RULE_TOP));
    }

    #[test]
    fn extra_colons_stay_with_the_image_part() {
        let (_dir, mut provider, assets) = setup(&[]);
        let err = parse_rules("du.svg:x:Titolo:Teksto\n", &assets, &mut provider).unwrap_err();
        match err {
            DeckError::UnresolvedReference { name, .. } => assert_eq!(name, "du.svg:x"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    fn keeper_registry(provider: &mut ImageProvider, assets: &DeckAssets) -> KeeperRegistry {
        let mut registry = KeeperRegistry::new();
        parse_keepers(
            "pano.svg:Pano\nlakto.svg:Lakto\n",
            assets,
            provider,
            &mut registry,
        )
        .unwrap();
        registry
    }

    #[test]
    fn goal_note_defaults_to_both_keepers() {
        let (_dir, mut provider, assets) = setup(&["pano.svg", "lakto.svg"]);
        let registry = keeper_registry(&mut provider, &assets);
        let cards = parse_goals("Matenmanĝo:pano:lakto\n", &assets, &mut provider, &registry).unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].title(), Some("Matenmanĝo"));
        assert_eq!(
            cards[0].bottom_paragraph(),
            Some("Ludanto venkas, kiu havas kaj Panon kaj Lakton sur la tablo.")
        );
        let images = cards[0].bottom_images().unwrap();
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|image| matches!(image, Drawable::Image(_))));
    }

    #[test]
    fn inverted_keeper_is_wrapped_in_the_overlay() {
        let (_dir, mut provider, assets) = setup(&["pano.svg", "lakto.svg"]);
        let registry = keeper_registry(&mut provider, &assets);
        let cards = parse_goals(
            "Sen Lakto:pano:!lakto:Havu panon sen lakto.\n",
            &assets,
            &mut provider,
            &registry,
        )
        .unwrap();
        assert_eq!(cards[0].bottom_paragraph(), Some("Havu panon sen lakto."));
        let images = cards[0].bottom_images().unwrap();
        assert!(matches!(images[0], Drawable::Image(_)));
        assert!(matches!(images[1], Drawable::Painter(_)));
    }

    #[test]
    fn special_goal_uses_its_own_image() {
        let (_dir, mut provider, assets) = setup(&["dek.svg"]);
        let registry = KeeperRegistry::new();
        let cards = parse_goals("@Dek Kartoj:dek.svg:Havu dek kartojn.\n", &assets, &mut provider, &registry)
            .unwrap();
        assert_eq!(cards[0].title(), Some("Dek Kartoj"));
        assert_eq!(cards[0].bottom_paragraph(), Some("Havu dek kartojn."));
        assert_eq!(cards[0].bottom_images().map(|i| i.len()), Some(1));
        assert_eq!(cards[0].color(), Some(Palette::Goal.color()));
    }

    #[test]
    fn unknown_keeper_reference_fails() {
        let (_dir, mut provider, assets) = setup(&["pano.svg", "lakto.svg"]);
        let registry = keeper_registry(&mut provider, &assets);
        let err = parse_goals("Celo:pano:!fromaĝo\n", &assets, &mut provider, &registry).unwrap_err();
        match err {
            DeckError::UnresolvedReference { kind, name } => {
                assert_eq!(kind, "keeper");
                assert_eq!(name, "fromaĝo");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn deck_loads_in_family_order() {
        let images = image_dir(&["pano.svg", "lakto.svg", "du.svg"]);
        let templates = tempfile::tempdir().unwrap();
        fs::write(templates.path().join("actions.txt"), ":Prenu 2\nPrenu du.\n").unwrap();
        fs::write(templates.path().join("keepers.txt"), "pano.svg:Pano\nlakto.svg:Lakto\n").unwrap();
        fs::write(templates.path().join("goals.txt"), "Matenmanĝo:pano:lakto\n").unwrap();
        fs::write(templates.path().join("rules.txt"), "du.svg:Prenu 2:Prenu du kartojn.\n").unwrap();

        let mut provider = ImageProvider::new(images.path());
        let deck = CardDeck::load(templates.path(), &mut provider).unwrap();
        let types: Vec<_> = deck.iter().map(|card| card.card_type().unwrap_or("")).collect();
        assert_eq!(types, ["Bazaj Reguloj", "Ago", "Tenaĵo", "Tenaĵo", "Celo", "Regulo"]);
    }

    #[test]
    fn missing_template_file_is_reported() {
        let images = image_dir(&[]);
        let templates = tempfile::tempdir().unwrap();
        let mut provider = ImageProvider::new(images.path());
        let err = CardDeck::load(templates.path(), &mut provider).unwrap_err();
        assert!(matches!(err, DeckError::UnresolvedReference { kind: "template", .. }));
    }
}
