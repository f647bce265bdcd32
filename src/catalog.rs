use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use crossbeam_channel::Receiver;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::config::CatalogConfig;
use crate::error::Error;
use crate::keymap;
use crate::step::{self, Step};

/// Position given to exercises that don't carry an explicit `sort_order`.
pub const DEFAULT_SORT_ORDER: i64 = 100;

const REMOTE_COLUMNS: &str = "id,title,description,sequence,difficulty,sort_order,created_at";

/// Difficulty rank, ordered from easiest to hardest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum Difficulty {
    #[default]
    Principiante,
    Basico,
    Intermedio,
    Avanzado,
}

impl Difficulty {
    pub fn label(self) -> &'static str {
        match self {
            Difficulty::Principiante => "principiante",
            Difficulty::Basico => "basico",
            Difficulty::Intermedio => "intermedio",
            Difficulty::Avanzado => "avanzado",
        }
    }
}

/// Unknown or missing labels rank with the easiest exercises.
impl From<Option<String>> for Difficulty {
    fn from(label: Option<String>) -> Self {
        let Some(label) = label else {
            return Difficulty::default();
        };
        match label.trim().to_lowercase().as_str() {
            "principiante" => Difficulty::Principiante,
            "basico" | "básico" => Difficulty::Basico,
            "intermedio" => Difficulty::Intermedio,
            "avanzado" => Difficulty::Avanzado,
            other => {
                log::warn!("Unknown difficulty {other:?}, ranking as principiante");
                Difficulty::default()
            }
        }
    }
}

/// A practice exercise: an ordered list of step tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "sequence_tokens")]
    pub sequence: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub sort_order: Option<i64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
}

/// RFC 3339, or a zone-less timestamp read as UTC. Anything else, including
/// a missing field, is the Unix epoch.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = value.as_str().and_then(parse_timestamp);
    if parsed.is_none() && !value.is_null() {
        log::debug!("Unreadable created_at {value}, using the epoch");
    }
    Ok(parsed.unwrap_or(DateTime::<Utc>::UNIX_EPOCH))
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| naive.and_utc())
}

/// Decode a JSON array of exercise records. A record that does not decode
/// is logged and skipped; only a body that is not an array fails.
pub fn decode_records(json: &str) -> Result<Vec<Exercise>, Error> {
    let records: Vec<Value> = serde_json::from_str(json)?;
    let exercises = records
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| match serde_json::from_value(record) {
            Ok(exercise) => Some(exercise),
            Err(e) => {
                log::warn!("Skipping catalog record {i}: {e}");
                None
            }
        })
        .collect();
    Ok(exercises)
}

/// Accept any JSON for `sequence`: arrays are stringified entry by entry,
/// anything else is an empty sequence.
fn sequence_tokens<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tokens = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(tokens)
}

impl Exercise {
    pub fn steps(&self) -> Vec<Step> {
        self.sequence.iter().map(|t| Step::parse(t)).collect()
    }

    /// One `UnknownKey` per step key the mapping table can't resolve.
    pub fn unknown_keys(&self) -> Vec<Error> {
        self.steps()
            .iter()
            .flat_map(|s| s.unknown_keys().map(str::to_owned).collect::<Vec<_>>())
            .map(|key| Error::UnknownKey {
                exercise: self.id.clone(),
                key,
            })
            .collect()
    }
}

fn chord_tokens(roots: &[&str], chord: fn(&str) -> Option<[&'static str; 3]>) -> Vec<String> {
    roots
        .iter()
        .filter_map(|root| chord(root))
        .map(|keys| step::encode(&keys))
        .collect()
}

/// Exercises shipped with the binary: note locations and root-position triads.
pub fn builtin_exercises() -> Vec<Exercise> {
    let now = Utc::now();
    vec![
        Exercise {
            id: "builtin-do-re-mi".into(),
            title: "Do Re Mi Fa Sol La Si Do".into(),
            description: Some(
                "Play the C major scale in order. White keys: A=Do, S=Re, D=Mi, F=Fa, \
                 G=Sol, H=La, J=Si, K=Do."
                    .into(),
            ),
            sequence: ["a", "s", "d", "f", "g", "h", "j", "k"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
            difficulty: Difficulty::Principiante,
            sort_order: Some(0),
            created_at: now,
        },
        Exercise {
            id: "builtin-acordes-mayores".into(),
            title: "Major chords (C, F, G)".into(),
            description: Some("Hold all three notes of each chord together.".into()),
            sequence: chord_tokens(&["C", "F", "G"], keymap::major_chord),
            difficulty: Difficulty::Basico,
            sort_order: Some(1),
            created_at: now,
        },
        Exercise {
            id: "builtin-acordes-mayores-escala".into(),
            title: "Chords on every degree".into(),
            description: Some("Root-position triads on C, D, E, F, G, A and B.".into()),
            sequence: chord_tokens(&["C", "D", "E", "F", "G", "A", "B"], keymap::major_chord),
            difficulty: Difficulty::Intermedio,
            sort_order: Some(2),
            created_at: now,
        },
        Exercise {
            id: "builtin-acordes-menores".into(),
            title: "Minor chords (C, D, A)".into(),
            description: Some("C minor, D minor and A minor. Uses the black keys Q-T.".into()),
            sequence: chord_tokens(&["C", "D", "A"], keymap::minor_chord),
            difficulty: Difficulty::Basico,
            sort_order: Some(3),
            created_at: now,
        },
    ]
}

/// Union of built-in and external exercises keyed by id, built-ins first
/// and never replaced. Sorted by `sort_order` (default 100), then difficulty;
/// the sort is stable so remaining ties keep insertion order.
pub fn merge_exercises(builtin: Vec<Exercise>, external: Vec<Exercise>) -> Vec<Exercise> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(builtin.len() + external.len());
    for ex in builtin.into_iter().chain(external) {
        if seen.insert(ex.id.clone()) {
            merged.push(ex);
        } else {
            log::debug!("Dropping duplicate exercise id {:?}", ex.id);
        }
    }
    merged.sort_by_key(|ex| (ex.sort_order.unwrap_or(DEFAULT_SORT_ORDER), ex.difficulty));
    merged
}

/// Where external exercises come from.
pub trait CatalogSource: Send {
    fn name(&self) -> String;
    fn fetch_all(&self) -> Result<Vec<Exercise>, Error>;
}

/// A JSON array of exercise records on disk.
pub struct JsonFileCatalog {
    path: PathBuf,
}

impl JsonFileCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl CatalogSource for JsonFileCatalog {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch_all(&self) -> Result<Vec<Exercise>, Error> {
        let content = std::fs::read_to_string(&self.path)?;
        decode_records(&content)
    }
}

/// The `exercises` table of a Supabase project, read over its REST API.
pub struct SupabaseCatalog {
    url: String,
    api_key: String,
}

impl SupabaseCatalog {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/exercises", self.url.trim_end_matches('/'))
    }
}

impl CatalogSource for SupabaseCatalog {
    fn name(&self) -> String {
        self.endpoint()
    }

    fn fetch_all(&self) -> Result<Vec<Exercise>, Error> {
        if self.url.is_empty() {
            return Err(Error::CatalogFetch("no catalog URL configured".into()));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let body = client
            .get(self.endpoint())
            .query(&[("select", REMOTE_COLUMNS), ("order", "created_at.asc")])
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()?
            .error_for_status()?
            .text()?;
        decode_records(&body)
    }
}

/// Pick a source from config: a local file wins over a remote URL.
pub fn source_from(config: &CatalogConfig) -> Option<Box<dyn CatalogSource>> {
    if let Some(path) = &config.file {
        return Some(Box::new(JsonFileCatalog::new(path)));
    }
    config
        .url
        .as_ref()
        .map(|url| -> Box<dyn CatalogSource> {
            Box::new(SupabaseCatalog::new(url, config.api_key.clone().unwrap_or_default()))
        })
}

/// Fetch from `source`, substituting an empty list on failure.
pub fn fetch_or_empty(source: &dyn CatalogSource) -> Vec<Exercise> {
    match source.fetch_all() {
        Ok(exercises) => {
            log::info!("Loaded {} exercise(s) from {}", exercises.len(), source.name());
            exercises
        }
        Err(e) => {
            log::warn!("Using built-in exercises only ({}): {e}", source.name());
            Vec::new()
        }
    }
}

/// Built-ins merged with whatever `source` provides.
pub fn load(source: Option<&dyn CatalogSource>) -> Vec<Exercise> {
    let external = source.map(fetch_or_empty).unwrap_or_default();
    merge_exercises(builtin_exercises(), external)
}

/// Fetch on a worker thread. The receiver yields exactly one list
/// (empty on failure); the UI loop drains it without blocking.
pub fn spawn_fetch(source: Box<dyn CatalogSource>) -> Receiver<Vec<Exercise>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let spawned = std::thread::Builder::new()
        .name("catalog-fetch".into())
        .spawn(move || {
            let exercises = fetch_or_empty(source.as_ref());
            let _ = tx.send(exercises);
        });
    if let Err(e) = spawned {
        log::warn!("Failed to start catalog fetch: {e}");
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn exercise(id: &str, sort_order: Option<i64>, difficulty: Difficulty) -> Exercise {
        Exercise {
            id: id.into(),
            title: format!("title {id}"),
            description: None,
            sequence: vec!["a".into()],
            difficulty,
            sort_order,
            created_at: Utc::now(),
        }
    }

    struct FailingSource;

    impl CatalogSource for FailingSource {
        fn name(&self) -> String {
            "failing".into()
        }
        fn fetch_all(&self) -> Result<Vec<Exercise>, Error> {
            Err(Error::CatalogFetch("offline".into()))
        }
    }

    struct FixedSource(Vec<Exercise>);

    impl CatalogSource for FixedSource {
        fn name(&self) -> String {
            "fixed".into()
        }
        fn fetch_all(&self) -> Result<Vec<Exercise>, Error> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn builtin_wins_on_id_clash() {
        let builtin = vec![exercise("x", Some(1), Difficulty::Basico)];
        let mut remote = exercise("x", Some(0), Difficulty::Avanzado);
        remote.title = "remote".into();
        let merged = merge_exercises(builtin.clone(), vec![remote]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0], builtin[0]);
    }

    #[test]
    fn first_external_duplicate_kept() {
        let mut first = exercise("y", None, Difficulty::Basico);
        first.title = "first".into();
        let mut second = exercise("y", None, Difficulty::Basico);
        second.title = "second".into();
        let merged = merge_exercises(Vec::new(), vec![first, second]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "first");
    }

    #[test]
    fn missing_sort_order_sorts_by_difficulty() {
        let merged = merge_exercises(
            Vec::new(),
            vec![
                exercise("hard", None, Difficulty::Avanzado),
                exercise("easy", None, Difficulty::Principiante),
            ],
        );
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["easy", "hard"]);
    }

    #[test]
    fn sort_order_first_then_stable() {
        let merged = merge_exercises(
            vec![exercise("b1", Some(5), Difficulty::Basico)],
            vec![
                exercise("none", None, Difficulty::Principiante),
                exercise("b2", Some(5), Difficulty::Basico),
                exercise("hundred", Some(100), Difficulty::Principiante),
                exercise("zero", Some(0), Difficulty::Avanzado),
            ],
        );
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["zero", "b1", "b2", "none", "hundred"]);
    }

    #[test]
    fn builtins_are_ordered_and_valid() {
        let merged = merge_exercises(builtin_exercises(), Vec::new());
        let ids: Vec<_> = merged.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            [
                "builtin-do-re-mi",
                "builtin-acordes-mayores",
                "builtin-acordes-mayores-escala",
                "builtin-acordes-menores",
            ]
        );
        for ex in &merged {
            assert!(ex.unknown_keys().is_empty(), "{}", ex.id);
        }
        assert_eq!(merged[1].sequence, ["a,d,g", "f,h,a", "g,j,s"]);
        assert_eq!(merged[3].sequence, ["a,w,g", "s,f,h", "h,a,d"]);
        assert_eq!(merged[2].sequence.len(), 7);
    }

    #[test]
    fn decodes_wire_records() {
        let json = r#"[
            {"id": "1", "title": "Scale", "description": null, "sequence": ["a", "S"],
             "difficulty": "intermedio", "sort_order": 4, "created_at": "2024-03-01T10:00:00+00:00"},
            {"id": "2", "title": "Loose", "sequence": [1, "a,d"], "created_at": "2024-03-02T10:00:00Z"},
            {"id": "3", "title": "Odd", "sequence": "a", "difficulty": "experto",
             "created_at": "2024-03-03T10:00:00Z"},
            {"id": "4", "title": "Naive", "sequence": ["d"], "created_at": "2024-03-01T10:00:00.123456"},
            {"id": "5", "title": "Undated", "sequence": ["f"]},
            {"id": "6", "sequence": ["g"], "created_at": "2024-03-04T10:00:00Z"},
            {"id": "7", "title": "Garbled", "sequence": ["h"], "created_at": "yesterday"}
        ]"#;
        let exercises = decode_records(json).unwrap();
        let ids: Vec<_> = exercises.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3", "4", "5", "7"]);
        assert_eq!(exercises[0].difficulty, Difficulty::Intermedio);
        assert_eq!(exercises[0].sort_order, Some(4));
        assert_eq!(exercises[0].sequence, ["a", "S"]);
        assert_eq!(exercises[1].difficulty, Difficulty::Principiante);
        assert_eq!(exercises[1].sequence, ["1", "a,d"]);
        assert_eq!(exercises[1].description, None);
        assert!(exercises[2].sequence.is_empty());
        assert_eq!(exercises[2].difficulty, Difficulty::Principiante);

        assert_eq!(exercises[0].created_at.to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert_eq!(
            exercises[3].created_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            "2024-03-01 10:00:00.123456"
        );
        assert_eq!(exercises[4].created_at, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(exercises[5].created_at, DateTime::<Utc>::UNIX_EPOCH);

        assert!(decode_records(r#"{"id": "1"}"#).is_err());
        assert!(decode_records("[]").unwrap().is_empty());
    }

    #[test]
    fn unknown_keys_reported() {
        let mut ex = exercise("u", None, Difficulty::Basico);
        ex.sequence = vec!["a".into(), "a,z".into(), "x".into()];
        let keys: Vec<_> = ex
            .unknown_keys()
            .into_iter()
            .map(|e| match e {
                Error::UnknownKey { key, .. } => key,
                other => panic!("unexpected {other}"),
            })
            .collect();
        assert_eq!(keys, ["z", "x"]);
    }

    #[test]
    fn failing_source_falls_back_to_builtins() {
        let merged = load(Some(&FailingSource as &dyn CatalogSource));
        assert_eq!(merged.len(), builtin_exercises().len());
        assert_eq!(load(None).len(), builtin_exercises().len());
    }

    #[test]
    fn external_exercises_merged() {
        let source = FixedSource(vec![exercise("remote", None, Difficulty::Basico)]);
        let merged = load(Some(&source as &dyn CatalogSource));
        assert_eq!(merged.len(), builtin_exercises().len() + 1);
        assert_eq!(merged.last().unwrap().id, "remote");
    }

    #[test]
    fn json_file_source() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "f", "title": "File", "sequence": ["a"], "created_at": "2024-01-01T00:00:00Z"}}]"#
        )
        .unwrap();
        let exercises = JsonFileCatalog::new(file.path()).fetch_all().unwrap();
        assert_eq!(exercises.len(), 1);
        assert_eq!(exercises[0].id, "f");

        let mut mixed = tempfile::NamedTempFile::new().unwrap();
        write!(
            mixed,
            r#"[{{"id": "ok", "title": "Kept", "sequence": ["a"], "created_at": "2024-01-01T00:00:00Z"}},
                {{"id": "pg", "title": "Naive", "sequence": ["s"], "created_at": "2024-03-01T10:00:00.123456"}},
                {{"title": "No id", "sequence": ["d"]}}]"#
        )
        .unwrap();
        let exercises = JsonFileCatalog::new(mixed.path()).fetch_all().unwrap();
        let ids: Vec<_> = exercises.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["ok", "pg"]);

        assert!(JsonFileCatalog::new("/nonexistent/catalog.json").fetch_all().is_err());
    }

    #[test]
    fn spawned_fetch_delivers_once() {
        let rx = spawn_fetch(Box::new(FailingSource));
        assert!(rx.recv().unwrap().is_empty());
        assert!(rx.recv().is_err());
    }

    #[test]
    fn source_selection() {
        let mut config = CatalogConfig::default();
        assert!(source_from(&config).is_none());
        config.url = Some("https://example.supabase.co/".into());
        assert_eq!(
            source_from(&config).unwrap().name(),
            "https://example.supabase.co/rest/v1/exercises"
        );
        config.file = Some("exercises.json".into());
        assert_eq!(source_from(&config).unwrap().name(), "exercises.json");
    }

    #[test]
    fn supabase_without_url_fails() {
        assert!(SupabaseCatalog::new("", "key").fetch_all().is_err());
    }
}
