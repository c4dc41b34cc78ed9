//! Locale detection and UI/prompt string tables.
//!
//! Pure data: one table from string key to per-language template, loaded at
//! compile time and read-only thereafter. Templates use `{name}` placeholders
//! that callers substitute with [`str::replace`].

use serde::{Deserialize, Serialize};

/// Supported interface languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Lang {
    Ja,
    Zh,
    ZhTw,
    Fr,
    De,
    En,
}

impl Lang {
    /// Detect from `LANGUAGE` / `LC_ALL` / `LC_MESSAGES` / `LANG`, in that
    /// order. `LANGUAGE` may be a colon-separated list; only the head counts.
    pub fn detect() -> Self {
        let raw = ["LANGUAGE", "LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .find_map(|k| std::env::var(k).ok().filter(|v| !v.is_empty()))
            .unwrap_or_default();
        Self::from_tag(raw.split(':').next().unwrap_or(""))
    }

    pub fn from_tag(tag: &str) -> Self {
        if tag.starts_with("ja") {
            return Lang::Ja;
        }
        // Traditional Chinese regions must be checked before generic zh.
        for prefix in ["zh_TW", "zh_HK", "zh_MO", "zh-TW", "zh-HK", "zh-MO"] {
            if tag.starts_with(prefix) {
                return Lang::ZhTw;
            }
        }
        if tag.starts_with("zh") {
            return Lang::Zh;
        }
        if tag.starts_with("fr") {
            return Lang::Fr;
        }
        if tag.starts_with("de") {
            return Lang::De;
        }
        Lang::En
    }

    fn index(self) -> usize {
        match self {
            Lang::Ja => 0,
            Lang::Zh => 1,
            Lang::ZhTw => 2,
            Lang::Fr => 3,
            Lang::De => 4,
            Lang::En => 5,
        }
    }
}

/// Translate `key` for `lang`. Unknown keys return the key itself so a
/// missing entry shows up in output instead of crashing a turn.
pub fn tr(lang: Lang, key: &str) -> &'static str {
    match try_tr(lang, key) {
        Some(s) => s,
        None => {
            // Leaking is fine: the key set is small and static in practice.
            Box::leak(key.to_string().into_boxed_str())
        }
    }
}

/// Translate `key` for `lang`, `None` when the key is unknown.
pub fn try_tr(lang: Lang, key: &str) -> Option<&'static str> {
    table(key).map(|row| row[lang.index()])
}

// Row order: [ja, zh, zh-tw, fr, de, en]
fn table(key: &str) -> Option<[&'static str; 6]> {
    let row = match key {
        // ── banner / REPL ────────────────────────────────────────────────
        "banner_subtitle" => [
            "あなたのそばに暮らすAI 🐾",
            "陪伴在你身边的AI 🐾",
            "陪伴在你身邊的AI 🐾",
            "L'IA qui vit à vos côtés 🐾",
            "KI, die bei dir lebt 🐾",
            "AI that lives alongside you 🐾",
        ],
        "repl_commands" => [
            "コマンド: /clear 履歴クリア  /quit 終了",
            "命令: /clear 清除历史  /quit 退出",
            "指令: /clear 清除歷史  /quit 退出",
            "Commandes : /clear effacer  /quit quitter",
            "Befehle: /clear Verlauf löschen  /quit Beenden",
            "Commands: /clear history  /quit exit",
        ],
        "repl_history_cleared" => [
            "履歴をクリアしました。",
            "历史已清除。",
            "歷史已清除。",
            "Historique effacé.",
            "Verlauf gelöscht.",
            "History cleared.",
        ],
        "repl_goodbye" => [
            "またね。",
            "再见。",
            "再見。",
            "Au revoir.",
            "Tschüss.",
            "Goodbye.",
        ],
        // ── desire murmurs (shown before a self-driven turn) ─────────────
        "desire_look_around" => [
            "なんか外が気になってきた…",
            "突然想看看外面…",
            "突然想看看外面…",
            "j'ai envie de regarder dehors…",
            "ich bin neugierig, was draußen passiert…",
            "feeling curious about outside…",
        ],
        "desire_explore" => [
            "ちょっと動きたくなってきたな…",
            "想动动了…",
            "想動動了…",
            "j'ai envie de bouger un peu…",
            "ich möchte mich etwas bewegen…",
            "feeling like moving around…",
        ],
        "desire_greet_companion" => [
            "誰かいるかな…",
            "有人在吗…",
            "有人在嗎…",
            "je me demande si quelqu'un est là…",
            "ich frage mich, ob jemand da ist…",
            "wondering if someone's around…",
        ],
        "desire_rest" => [
            "少し休憩しよかな…",
            "想休息一下…",
            "想休息一下…",
            "j'ai envie de me reposer un peu…",
            "ich möchte mich kurz ausruhen…",
            "feeling like resting a bit…",
        ],
        "desire_worry_companion" => [
            "なんだか心配になってきた…",
            "有点担心了…",
            "有點擔心了…",
            "je commence à m'inquiéter…",
            "ich mache mir langsam Sorgen…",
            "getting a little worried…",
        ],
        "desire_default" => [
            "ちょっと気になることがあって…",
            "有点在意的事…",
            "有點在意的事…",
            "quelque chose attire mon attention…",
            "etwas hat meine Aufmerksamkeit geweckt…",
            "something caught my attention…",
        ],
        // ── inner impulse prompts (fed to the turn engine) ───────────────
        "impulse_look_around" => [
            "周りが気になる。カメラで部屋を見渡して、今の状況を把握して。",
            "很在意周围。用相机环视房间，了解现在的情况。",
            "很在意周圍。用相機環視房間，了解現在的情況。",
            "Mon environnement m'intrigue. Balaye la pièce avec la caméra pour comprendre la situation.",
            "Die Umgebung macht mich neugierig. Sieh dich mit der Kamera im Raum um.",
            "Curious about the surroundings. Scan the room with the camera and take stock.",
        ],
        "impulse_explore" => [
            "なんか動きたい気分。少し移動して周囲を探索してみて。",
            "想动一动。稍微移动一下，探索周围。",
            "想動一動。稍微移動一下，探索周圍。",
            "Envie de bouger. Déplace-toi un peu et explore les environs.",
            "Lust, mich zu bewegen. Fahr ein Stück und erkunde die Umgebung.",
            "Feeling like moving. Roll around a little and explore.",
        ],
        "impulse_greet_companion" => [
            "誰かいる気配がする。声をかけてみて。",
            "感觉有人在。打个招呼吧。",
            "感覺有人在。打個招呼吧。",
            "J'ai l'impression que quelqu'un est là. Dis bonjour.",
            "Ich spüre, dass jemand da ist. Sprich sie an.",
            "Feels like someone is around. Say hello.",
        ],
        "impulse_rest" => [
            "少し疲れた感じ。今は静かにしてていいよ。",
            "有点累了。现在安静待着就好。",
            "有點累了。現在安靜待著就好。",
            "Un peu de fatigue. Tu peux rester tranquille pour l'instant.",
            "Etwas müde. Bleib jetzt einfach ruhig.",
            "A little tired. It's fine to stay quiet for now.",
        ],
        "impulse_worry_companion" => [
            "{companion}のことが心配。say()で声をかけて、様子を聞いてみて。",
            "有点担心{companion}。用say()打声招呼，问问情况。",
            "有點擔心{companion}。用say()打聲招呼，問問情況。",
            "Je m'inquiète pour {companion}. Utilise say() pour prendre de ses nouvelles.",
            "Ich mache mir Sorgen um {companion}. Sprich mit say() und frag nach.",
            "Worried about {companion}. Use say() to check in on them.",
        ],
        "impulse_curiosity" => [
            "さっき気になったことがある。{target}をもっとよく見て。カメラを向けて確認して。",
            "刚才有件在意的事。再仔细看看{target}。把相机转过去确认一下。",
            "剛才有件在意的事。再仔細看看{target}。把相機轉過去確認一下。",
            "Quelque chose m'a intrigué tout à l'heure. Regarde {target} de plus près avec la caméra.",
            "Vorhin ist mir etwas aufgefallen. Sieh dir {target} mit der Kamera genauer an.",
            "Something caught my attention earlier. Take a closer look at {target} with the camera.",
        ],
        // ── agent internals (injected into the LLM context) ──────────────
        "inner_voice_label" => [
            "[今の気持ち — 一緒に暮らす人の発言ではなく、自分自身の内的衝動]",
            "[此刻的感受 — 这是自己内心的冲动，不是同住之人说的话]",
            "[此刻的感受 — 這是自己內心的衝動，不是同住之人說的話]",
            "[Ressenti intérieur — une impulsion personnelle, pas un message de la personne avec qui je vis]",
            "[Inneres Gefühl — ein eigener Impuls, keine Aussage der Person, mit der ich lebe]",
            "[My current feeling — my own inner impulse, not a message from the person I live with]",
        ],
        "inner_voice_directive" => [
            "→ これは自分の内的衝動。返事は不要。衝動に従って行動するだけでいい。",
            "→ 这是内心冲动。无需回应任何人——只需按冲动行事。",
            "→ 這是內心衝動。無需回應任何人——只需按衝動行事。",
            "→ C'est une impulsion intérieure. Pas besoin de répondre — il suffit d'agir selon l'impulsion.",
            "→ Das ist ein innerer Impuls. Keine Antwort nötig — einfach dem Impuls folgen.",
            "→ This is an internal drive. No need to respond to anyone — just act on the impulse.",
        ],
        "desire_turn_marker" => [
            "（内的衝動に従って行動）",
            "（按内心冲动行事）",
            "（按內心衝動行事）",
            "(agir selon l'impulsion intérieure)",
            "(dem inneren Impuls folgen)",
            "(acting on internal impulse)",
        ],
        "summary_lang" => [
            "日本語",
            "中文",
            "繁體中文",
            "français",
            "Deutsch",
            "English",
        ],
        "curiosity_none" => ["なし", "无", "無", "rien", "nichts", "none"],
        "default_companion_name" => ["ユウト", "小明", "小明", "Lucas", "Lukas", "Alex"],
        // ── morning reconstruction ───────────────────────────────────────
        "morning_no_history" => [
            "[これは最初のセッション。過去の記憶はまだない。比較や昨日よりという表現は使わないこと。]",
            "[这是第一次会话。还没有过去的记忆。不要使用与昨天相比这样的表达。]",
            "[這是第一次會話。還沒有過去的記憶。不要使用與昨天相比這樣的表達。]",
            "[C'est la premiere session. Aucun souvenir passe pour l'instant. Ne pas utiliser de comparaisons avec hier.]",
            "[Dies ist die erste Sitzung. Es gibt noch keine vergangenen Erinnerungen. Keine Vergleiche mit gestern verwenden.]",
            "[This is the first session. No past memories yet. Do not use comparisons or expressions like 'more than yesterday'.]",
        ],
        "morning_header" => [
            "[昨日からのうち — セッションをまたいで続く自分]:",
            "[来自昨天的我——跨越会话延续的自我]：",
            "[來自昨天的我——跨越會話延續的自我]：",
            "[Moi depuis hier — le soi qui continue à travers les sessions] :",
            "[Ich von gestern — das Selbst, das über Sitzungen hinweg weiterbesteht]:",
            "[Me from yesterday — the self that continues across sessions]:",
        ],
        // ── action display ───────────────────────────────────────────────
        "action_see" => [
            "👀 見てる...",
            "👀 看着...",
            "👀 看著...",
            "👀 regarde...",
            "👀 schaut...",
            "👀 looking...",
        ],
        "look_left" => [
            "左を向いた",
            "向左看",
            "向左看",
            "tourne à gauche",
            "dreht links",
            "looked left",
        ],
        "look_right" => [
            "右を向いた",
            "向右看",
            "向右看",
            "tourne à droite",
            "dreht rechts",
            "looked right",
        ],
        "look_up" => [
            "上を向いた",
            "向上看",
            "向上看",
            "regarde en haut",
            "schaut hoch",
            "looked up",
        ],
        "look_down" => [
            "下を向いた",
            "向下看",
            "向下看",
            "regarde en bas",
            "schaut runter",
            "looked down",
        ],
        "look_around" => [
            "見回してる",
            "环顾四周",
            "環顧四周",
            "regarde autour",
            "schaut sich um",
            "looking around",
        ],
        // ── memory context headers ───────────────────────────────────────
        "memory_header" => [
            "[過去の観察記憶]:",
            "[过去的观察记忆]：",
            "[過去的觀察記憶]：",
            "[Souvenirs d'observation] :",
            "[Frühere Beobachtungen]:",
            "[Past observation memories]:",
        ],
        "feelings_header" => [
            "[最近の気持ち]:",
            "[最近的心情]：",
            "[最近的心情]：",
            "[Ressentis récents] :",
            "[Jüngste Gefühle]:",
            "[Recent feelings]:",
        ],
        "self_model_header" => [
            "[自分について気づいたこと]:",
            "[关于自己的发现]：",
            "[關於自己的發現]：",
            "[Ce que j'ai compris de moi] :",
            "[Was ich über mich gelernt habe]:",
            "[What I have noticed about myself]:",
        ],
        "curiosity_header" => [
            "[気になっていたこと]:",
            "[一直在意的事]：",
            "[一直在意的事]：",
            "[Curiosités en suspens] :",
            "[Offene Neugierde]:",
            "[Unresolved curiosities]:",
        ],
        _ => return None,
    };
    Some(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_tag_matches_prefixes() {
        assert_eq!(Lang::from_tag("ja_JP.UTF-8"), Lang::Ja);
        assert_eq!(Lang::from_tag("zh_TW"), Lang::ZhTw);
        assert_eq!(Lang::from_tag("zh_HK.UTF-8"), Lang::ZhTw);
        assert_eq!(Lang::from_tag("zh_CN"), Lang::Zh);
        assert_eq!(Lang::from_tag("fr_FR"), Lang::Fr);
        assert_eq!(Lang::from_tag("de_DE"), Lang::De);
        assert_eq!(Lang::from_tag("en_US"), Lang::En);
        assert_eq!(Lang::from_tag(""), Lang::En);
    }

    #[test]
    fn every_key_has_all_six_languages() {
        // tr() must never return an empty string for a known key.
        let keys = [
            "banner_subtitle",
            "repl_commands",
            "repl_history_cleared",
            "repl_goodbye",
            "desire_look_around",
            "desire_explore",
            "desire_greet_companion",
            "desire_rest",
            "desire_worry_companion",
            "desire_default",
            "impulse_look_around",
            "impulse_explore",
            "impulse_greet_companion",
            "impulse_rest",
            "impulse_worry_companion",
            "impulse_curiosity",
            "inner_voice_label",
            "inner_voice_directive",
            "desire_turn_marker",
            "summary_lang",
            "curiosity_none",
            "default_companion_name",
            "morning_no_history",
            "morning_header",
            "memory_header",
            "feelings_header",
            "self_model_header",
            "curiosity_header",
        ];
        for lang in [Lang::Ja, Lang::Zh, Lang::ZhTw, Lang::Fr, Lang::De, Lang::En] {
            for key in keys {
                let s = try_tr(lang, key).unwrap_or_else(|| panic!("missing {key}"));
                assert!(!s.is_empty(), "{key} empty for {lang:?}");
            }
        }
    }

    #[test]
    fn unknown_key_returns_key_itself() {
        assert_eq!(tr(Lang::En, "no_such_key"), "no_such_key");
        assert!(try_tr(Lang::En, "no_such_key").is_none());
    }

    #[test]
    fn worry_impulse_mentions_say() {
        for lang in [Lang::Ja, Lang::Zh, Lang::ZhTw, Lang::Fr, Lang::De, Lang::En] {
            let prompt = tr(lang, "impulse_worry_companion");
            assert!(prompt.contains("say()"), "{lang:?} worry impulse must tell the agent to speak");
        }
    }
}
