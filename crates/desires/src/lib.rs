//! Desire system — autonomous motivations for the embodied agent.
//!
//! Five desires grow (or not) with idle time and drive self-initiated turns
//! when the strongest crosses the trigger threshold. Levels are persisted
//! to a small JSON file on every mutation so restarts pick up mid-mood; a
//! corrupt file just resets to defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use familiar_config::locale::{tr, Lang};
use tracing::warn;

mod worry;

pub use worry::detect_worry_signal;

/// The fixed set of desires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Desire {
    LookAround,
    Explore,
    GreetCompanion,
    Rest,
    WorryCompanion,
}

impl Desire {
    pub const ALL: [Desire; 5] = [
        Desire::LookAround,
        Desire::Explore,
        Desire::GreetCompanion,
        Desire::Rest,
        Desire::WorryCompanion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Desire::LookAround => "look_around",
            Desire::Explore => "explore",
            Desire::GreetCompanion => "greet_companion",
            Desire::Rest => "rest",
            Desire::WorryCompanion => "worry_companion",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Desire::ALL.into_iter().find(|d| d.as_str() == raw)
    }

    /// Resting level a desire returns to when satisfied.
    fn default_level(self) -> f64 {
        match self {
            Desire::LookAround | Desire::Explore => 0.1,
            _ => 0.0,
        }
    }

    /// Growth per second of idle time. `worry_companion` never grows from
    /// time alone; only worry-signal boosts move it.
    fn growth_rate(self) -> f64 {
        match self {
            Desire::LookAround => 0.002,
            Desire::Explore => 0.001,
            _ => 0.0,
        }
    }
}

const TRIGGER_THRESHOLD: f64 = 0.6;

/// Manages autonomous desires that drive self-initiated behavior.
#[derive(Debug)]
pub struct DesireSystem {
    state_path: PathBuf,
    levels: BTreeMap<Desire, f64>,
    last_tick: Instant,
    curiosity_target: Option<String>,
}

impl DesireSystem {
    pub fn new(state_path: impl AsRef<Path>) -> Self {
        let state_path = state_path.as_ref().to_path_buf();
        let levels = load_levels(&state_path);
        Self { state_path, levels, last_tick: Instant::now(), curiosity_target: None }
    }

    pub fn level(&self, desire: Desire) -> f64 {
        self.levels.get(&desire).copied().unwrap_or(0.0)
    }

    pub fn curiosity_target(&self) -> Option<&str> {
        self.curiosity_target.as_deref()
    }

    pub fn set_curiosity_target(&mut self, target: Option<String>) {
        self.curiosity_target = target;
    }

    /// Update desire levels from elapsed wall time.
    pub fn tick(&mut self) {
        let elapsed = self.last_tick.elapsed().as_secs_f64();
        self.last_tick = Instant::now();
        self.advance(elapsed);
    }

    /// Time-driven growth, separated from the clock for testability.
    fn advance(&mut self, elapsed_secs: f64) {
        for desire in Desire::ALL {
            let current = self.level(desire);
            let grown = (current + desire.growth_rate() * elapsed_secs).clamp(0.0, 1.0);
            self.levels.insert(desire, grown);
        }
        self.save();
    }

    /// Reset a desire to its resting level after acting on it.
    pub fn satisfy(&mut self, desire: Desire) {
        self.levels.insert(desire, desire.default_level());
        self.save();
    }

    /// Add to a desire, clamped to [0, 1].
    pub fn boost(&mut self, desire: Desire, amount: f64) {
        let level = (self.level(desire) + amount).clamp(0.0, 1.0);
        self.levels.insert(desire, level);
        self.save();
    }

    /// Strongest desire, if it has crossed the trigger threshold.
    pub fn dominant(&mut self) -> Option<(Desire, f64)> {
        self.tick();
        Desire::ALL
            .into_iter()
            .map(|d| (d, self.level(d)))
            .filter(|(_, level)| *level >= TRIGGER_THRESHOLD)
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Natural-language impulse prompt for the dominant desire, if any.
    /// A pending curiosity target takes over the camera-driven desires.
    pub fn dominant_as_prompt(&mut self, lang: Lang, companion: &str) -> Option<(Desire, String)> {
        let (desire, _) = self.dominant()?;
        let prompt = match desire {
            Desire::LookAround | Desire::Explore if self.curiosity_target.is_some() => {
                let target = self.curiosity_target.as_deref().unwrap_or_default();
                tr(lang, "impulse_curiosity").replace("{target}", target)
            }
            Desire::LookAround => tr(lang, "impulse_look_around").to_string(),
            Desire::Explore => tr(lang, "impulse_explore").to_string(),
            Desire::GreetCompanion => tr(lang, "impulse_greet_companion").to_string(),
            Desire::Rest => tr(lang, "impulse_rest").to_string(),
            Desire::WorryCompanion => {
                tr(lang, "impulse_worry_companion").replace("{companion}", companion)
            }
        };
        Some((desire, prompt))
    }

    fn save(&self) {
        let map: BTreeMap<&str, f64> =
            self.levels.iter().map(|(d, v)| (d.as_str(), *v)).collect();
        let write = (|| -> std::io::Result<()> {
            if let Some(parent) = self.state_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let body = serde_json::to_string_pretty(&map).unwrap_or_default();
            std::fs::write(&self.state_path, body)
        })();
        if let Err(e) = write {
            warn!(error = %e, "could not save desires");
        }
    }
}

fn load_levels(path: &Path) -> BTreeMap<Desire, f64> {
    let defaults: BTreeMap<Desire, f64> =
        Desire::ALL.into_iter().map(|d| (d, d.default_level())).collect();
    let Ok(raw) = std::fs::read_to_string(path) else {
        return defaults;
    };
    match serde_json::from_str::<BTreeMap<String, f64>>(&raw) {
        Ok(map) => {
            let mut levels = defaults;
            for (name, value) in map {
                if let Some(desire) = Desire::parse(&name) {
                    levels.insert(desire, value.clamp(0.0, 1.0));
                }
            }
            levels
        }
        Err(_) => {
            warn!(path = %path.display(), "corrupt desire state, resetting to defaults");
            defaults
        }
    }
}

/// Shared handle: the scheduler owns mutation, the turn engine only boosts
/// and touches the curiosity target through these narrow accessors.
#[derive(Debug, Clone)]
pub struct Desires {
    inner: Arc<Mutex<DesireSystem>>,
}

impl Desires {
    pub fn new(system: DesireSystem) -> Self {
        Self { inner: Arc::new(Mutex::new(system)) }
    }

    pub fn boost(&self, desire: Desire, amount: f64) {
        self.inner.lock().expect("desire lock").boost(desire, amount);
    }

    pub fn satisfy(&self, desire: Desire) {
        self.inner.lock().expect("desire lock").satisfy(desire);
    }

    pub fn tick(&self) {
        self.inner.lock().expect("desire lock").tick();
    }

    pub fn level(&self, desire: Desire) -> f64 {
        self.inner.lock().expect("desire lock").level(desire)
    }

    pub fn curiosity_target(&self) -> Option<String> {
        self.inner.lock().expect("desire lock").curiosity_target().map(String::from)
    }

    pub fn set_curiosity_target(&self, target: Option<String>) {
        self.inner.lock().expect("desire lock").set_curiosity_target(target);
    }

    pub fn dominant(&self) -> Option<(Desire, f64)> {
        self.inner.lock().expect("desire lock").dominant()
    }

    pub fn dominant_as_prompt(&self, lang: Lang, companion: &str) -> Option<(Desire, String)> {
        self.inner.lock().expect("desire lock").dominant_as_prompt(lang, companion)
    }

    /// Snapshot of all levels, for the `/desires` debug display.
    pub fn snapshot(&self) -> Vec<(Desire, f64)> {
        let guard = self.inner.lock().expect("desire lock");
        Desire::ALL.into_iter().map(|d| (d, guard.level(d))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system() -> (tempfile::TempDir, DesireSystem) {
        let dir = tempfile::tempdir().unwrap();
        let sys = DesireSystem::new(dir.path().join("desires.json"));
        (dir, sys)
    }

    #[test]
    fn defaults_match_resting_levels() {
        let (_dir, sys) = system();
        assert_eq!(sys.level(Desire::LookAround), 0.1);
        assert_eq!(sys.level(Desire::Explore), 0.1);
        assert_eq!(sys.level(Desire::GreetCompanion), 0.0);
        assert_eq!(sys.level(Desire::WorryCompanion), 0.0);
    }

    #[test]
    fn tick_grows_levels_and_clamps() {
        let (_dir, mut sys) = system();
        sys.advance(100.0);
        assert!((sys.level(Desire::LookAround) - 0.3).abs() < 1e-9);
        assert!((sys.level(Desire::Explore) - 0.2).abs() < 1e-9);
        sys.advance(1_000_000.0);
        assert_eq!(sys.level(Desire::LookAround), 1.0);
        assert!(sys.level(Desire::Explore) <= 1.0);
    }

    #[test]
    fn worry_never_grows_from_time_alone() {
        let (_dir, mut sys) = system();
        sys.boost(Desire::WorryCompanion, 0.3);
        sys.advance(1_000_000.0);
        assert_eq!(sys.level(Desire::WorryCompanion), 0.3);
    }

    #[test]
    fn satisfy_is_idempotent() {
        let (_dir, mut sys) = system();
        sys.boost(Desire::LookAround, 0.8);
        sys.satisfy(Desire::LookAround);
        let once = sys.level(Desire::LookAround);
        sys.satisfy(Desire::LookAround);
        assert_eq!(sys.level(Desire::LookAround), once);
        assert_eq!(once, 0.1);
    }

    #[test]
    fn boost_is_additive_up_to_clamp() {
        let (_dir, mut sys) = system();
        sys.boost(Desire::GreetCompanion, 0.2);
        sys.boost(Desire::GreetCompanion, 0.3);
        assert!((sys.level(Desire::GreetCompanion) - 0.5).abs() < 1e-9);
        sys.boost(Desire::GreetCompanion, 0.9);
        assert_eq!(sys.level(Desire::GreetCompanion), 1.0);
    }

    #[test]
    fn dominant_requires_threshold() {
        let (_dir, mut sys) = system();
        assert!(sys.dominant().is_none());
        sys.boost(Desire::Explore, 0.45);
        // 0.1 + 0.45 = 0.55, still below 0.6
        assert!(sys.dominant().is_none());
        sys.boost(Desire::Explore, 0.1);
        let (desire, level) = sys.dominant().unwrap();
        assert_eq!(desire, Desire::Explore);
        assert!(level >= 0.6);
    }

    #[test]
    fn dominant_picks_highest() {
        let (_dir, mut sys) = system();
        sys.boost(Desire::Explore, 0.6);
        sys.boost(Desire::WorryCompanion, 0.9);
        assert_eq!(sys.dominant().unwrap().0, Desire::WorryCompanion);
    }

    #[test]
    fn curiosity_target_overrides_look_around_prompt() {
        let (_dir, mut sys) = system();
        sys.boost(Desire::LookAround, 0.9);
        sys.set_curiosity_target(Some("窓の外の赤い自転車".into()));
        let (desire, prompt) = sys.dominant_as_prompt(Lang::Ja, "ユウト").unwrap();
        assert_eq!(desire, Desire::LookAround);
        assert!(prompt.contains("窓の外の赤い自転車"));
    }

    #[test]
    fn worry_prompt_names_companion_and_say() {
        let (_dir, mut sys) = system();
        sys.boost(Desire::WorryCompanion, 0.7);
        let (_, prompt) = sys.dominant_as_prompt(Lang::En, "Alex").unwrap();
        assert!(prompt.contains("Alex"));
        assert!(prompt.contains("say()"));
    }

    #[test]
    fn levels_persist_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desires.json");
        {
            let mut sys = DesireSystem::new(&path);
            sys.boost(Desire::Rest, 0.42);
        }
        let sys = DesireSystem::new(&path);
        assert!((sys.level(Desire::Rest) - 0.42).abs() < 1e-9);
    }

    #[test]
    fn corrupt_state_file_resets_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desires.json");
        std::fs::write(&path, "{broken json").unwrap();
        let sys = DesireSystem::new(&path);
        assert_eq!(sys.level(Desire::LookAround), 0.1);
        assert_eq!(sys.level(Desire::WorryCompanion), 0.0);
    }

    #[test]
    fn unknown_desire_names_in_state_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("desires.json");
        std::fs::write(&path, r#"{"look_around": 0.5, "mystery": 0.9, "rest": 2.5}"#).unwrap();
        let sys = DesireSystem::new(&path);
        assert_eq!(sys.level(Desire::LookAround), 0.5);
        // Out-of-range persisted values are clamped on load.
        assert_eq!(sys.level(Desire::Rest), 1.0);
    }
}
