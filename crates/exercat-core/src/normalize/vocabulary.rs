//! Synonym tables and canonical sets.
//!
//! A [`Vocabulary`] is plain owned data: the built-in tables come from
//! [`Vocabulary::default`], and a JSON file with the same shape can replace
//! them per run. Table keys are stored in [`lookup_key`] form, and every
//! canonical value is also registered as a key for itself so that
//! normalizing an already-canonical value is a no-op.

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::text::lookup_key;

/// Refines a generic shoulder label using one isolated-muscle token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShoulderRefinement {
    pub isolated_token: String,
    pub label: String,
}

/// Owned normalization vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    /// Muscle-group synonyms (PST labels and other display labels).
    pub muscle_synonyms: BTreeMap<String, String>,
    /// Labels acceptable in the primary/secondary/tertiary slots.
    pub muscle_groups: BTreeSet<String>,
    /// The generic shoulder label that must be refined before use.
    pub generic_shoulder: String,
    pub shoulder_refinements: Vec<ShoulderRefinement>,
    /// Synonyms into the granular isolated-muscle vocabulary.
    pub isolated_synonyms: BTreeMap<String, String>,
    pub isolated_muscles: BTreeSet<String>,
    /// Group-level labels rejected from the isolated-muscle field.
    pub forbidden_isolated: BTreeSet<String>,
    pub force: BTreeMap<String, String>,
    pub mechanic: BTreeMap<String, String>,
    pub utility: BTreeMap<String, String>,
    pub difficulty: BTreeMap<String, String>,
    pub equipment: BTreeMap<String, String>,
    /// Canonical equipment token for anything mentioning "smith".
    pub smith_machine: String,
}

fn table(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

const MUSCLE_GROUPS: &[&str] = &[
    "Chest",
    "Front-Shoulder",
    "Middle-Shoulder",
    "Rear-Shoulder",
    "Biceps",
    "Triceps",
    "Forearms",
    "Latissimus Dorsi",
    "Upper Back",
    "Trapezius",
    "Rectus Abdominis",
    "External Obliques",
    "Lower Back",
    "Gluteus Maximus",
    "Hip-Adductors",
    "Hip-Flexors",
    "Quadriceps",
    "Hamstrings",
    "Calves",
    "Neck",
];

const MUSCLE_SYNONYMS: &[(&str, &str)] = &[
    ("pecs", "Chest"),
    ("pectorals", "Chest"),
    ("pectoralis major", "Chest"),
    ("upper chest", "Chest"),
    ("shoulders", "Shoulders"),
    ("shoulder", "Shoulders"),
    ("delts", "Shoulders"),
    ("deltoids", "Shoulders"),
    ("front delts", "Front-Shoulder"),
    ("front delt", "Front-Shoulder"),
    ("anterior deltoid", "Front-Shoulder"),
    ("side delts", "Middle-Shoulder"),
    ("side delt", "Middle-Shoulder"),
    ("lateral deltoid", "Middle-Shoulder"),
    ("medial deltoid", "Middle-Shoulder"),
    ("rear delts", "Rear-Shoulder"),
    ("rear delt", "Rear-Shoulder"),
    ("posterior deltoid", "Rear-Shoulder"),
    ("bicep", "Biceps"),
    ("tricep", "Triceps"),
    ("forearm", "Forearms"),
    ("lats", "Latissimus Dorsi"),
    ("lat", "Latissimus Dorsi"),
    ("mid back", "Upper Back"),
    ("rhomboids", "Upper Back"),
    ("traps", "Trapezius"),
    ("abs", "Rectus Abdominis"),
    ("abdominals", "Rectus Abdominis"),
    ("core", "Rectus Abdominis"),
    ("obliques", "External Obliques"),
    ("lower back", "Lower Back"),
    ("erector spinae", "Lower Back"),
    ("glutes", "Gluteus Maximus"),
    ("glute", "Gluteus Maximus"),
    ("adductors", "Hip-Adductors"),
    ("hip adductors", "Hip-Adductors"),
    ("hip flexors", "Hip-Flexors"),
    ("quads", "Quadriceps"),
    ("quad", "Quadriceps"),
    ("hams", "Hamstrings"),
    ("hamstring", "Hamstrings"),
    ("calf", "Calves"),
];

const ISOLATED_MUSCLES: &[&str] = &[
    "anterior-deltoid",
    "lateral-deltoid",
    "posterior-deltoid",
    "upper-pectoralis",
    "mid-lower-pectoralis",
    "long-head-bicep",
    "short-head-bicep",
    "lateral-head-triceps",
    "long-head-triceps",
    "medial-head-triceps",
    "wrist-flexors",
    "wrist-extensors",
    "lats",
    "upper-traps",
    "traps-middle",
    "lower-traps",
    "rhomboids",
    "teres-major",
    "infraspinatus",
    "upper-abdominals",
    "lower-abdominals",
    "obliques",
    "lowerback",
    "gluteus-maximus",
    "gluteus-medius",
    "inner-thigh",
    "hip-flexors",
    "rectus-femoris",
    "inner-quadriceps",
    "outer-quadriceps",
    "medial-hamstrings",
    "lateral-hamstrings",
    "gastrocnemius",
    "soleus",
    "tibialis",
    "neck",
];

const ISOLATED_SYNONYMS: &[(&str, &str)] = &[
    ("front delt", "anterior-deltoid"),
    ("front delts", "anterior-deltoid"),
    ("front deltoid", "anterior-deltoid"),
    ("side delt", "lateral-deltoid"),
    ("side delts", "lateral-deltoid"),
    ("medial deltoid", "lateral-deltoid"),
    ("middle deltoid", "lateral-deltoid"),
    ("rear delt", "posterior-deltoid"),
    ("rear delts", "posterior-deltoid"),
    ("rear deltoid", "posterior-deltoid"),
    ("upper chest", "upper-pectoralis"),
    ("clavicular pectoralis", "upper-pectoralis"),
    ("lower chest", "mid-lower-pectoralis"),
    ("sternal pectoralis", "mid-lower-pectoralis"),
    ("biceps long head", "long-head-bicep"),
    ("biceps short head", "short-head-bicep"),
    ("triceps long head", "long-head-triceps"),
    ("triceps lateral head", "lateral-head-triceps"),
    ("triceps medial head", "medial-head-triceps"),
    ("latissimus dorsi", "lats"),
    ("lat", "lats"),
    ("upper trapezius", "upper-traps"),
    ("middle trapezius", "traps-middle"),
    ("mid traps", "traps-middle"),
    ("lower trapezius", "lower-traps"),
    ("upper abs", "upper-abdominals"),
    ("lower abs", "lower-abdominals"),
    ("external obliques", "obliques"),
    ("lower back", "lowerback"),
    ("erector spinae", "lowerback"),
    ("glute max", "gluteus-maximus"),
    ("glute med", "gluteus-medius"),
    ("adductors", "inner-thigh"),
    ("vastus lateralis", "outer-quadriceps"),
    ("vastus medialis", "inner-quadriceps"),
    ("biceps femoris", "lateral-hamstrings"),
    ("semitendinosus", "medial-hamstrings"),
    ("semimembranosus", "medial-hamstrings"),
    ("calves", "gastrocnemius"),
    ("tibialis anterior", "tibialis"),
];

const FORBIDDEN_ISOLATED: &[&str] = &[
    "chest",
    "shoulders",
    "delts",
    "back",
    "upper back",
    "arms",
    "legs",
    "core",
    "abs",
    "biceps",
    "triceps",
    "quadriceps",
    "quads",
    "hamstrings",
    "glutes",
    "full body",
];

const FORCE: &[(&str, &str)] = &[
    ("push", "Push"),
    ("pushing", "Push"),
    ("press", "Push"),
    ("pull", "Pull"),
    ("pulling", "Pull"),
    ("push pull", "Push/Pull"),
    ("pull push", "Push/Pull"),
    ("push and pull", "Push/Pull"),
    ("hold", "Hold"),
    ("static", "Hold"),
    ("isometric", "Hold"),
    ("explosive", "Explosive"),
    ("plyometric", "Explosive"),
    ("ballistic", "Explosive"),
];

const MECHANIC: &[(&str, &str)] = &[
    ("compound", "Compound"),
    ("multi joint", "Compound"),
    ("multijoint", "Compound"),
    ("isolation", "Isolation"),
    ("isolated", "Isolation"),
    ("single joint", "Isolation"),
];

const UTILITY: &[(&str, &str)] = &[
    ("basic", "Basic"),
    ("primary", "Basic"),
    ("auxiliary", "Auxiliary"),
    ("accessory", "Auxiliary"),
    ("basic or auxiliary", "Basic or Auxiliary"),
];

const DIFFICULTY: &[(&str, &str)] = &[
    ("beginner", "Beginner"),
    ("easy", "Beginner"),
    ("novice", "Novice"),
    ("intermediate", "Intermediate"),
    ("medium", "Intermediate"),
    ("advanced", "Advanced"),
    ("hard", "Advanced"),
    ("expert", "Expert"),
];

const EQUIPMENT: &[(&str, &str)] = &[
    ("barbell", "Barbell"),
    ("olympic bar", "Barbell"),
    ("ez bar", "Barbell"),
    ("ez curl bar", "Barbell"),
    ("dumbbell", "Dumbbells"),
    ("dumbbells", "Dumbbells"),
    ("db", "Dumbbells"),
    ("cable", "Cables"),
    ("cables", "Cables"),
    ("cable machine", "Cables"),
    ("machine", "Machine"),
    ("leg press", "Machine"),
    ("plate loaded", "Machine"),
    ("selectorized", "Machine"),
    ("bodyweight", "Bodyweight"),
    ("body weight", "Bodyweight"),
    ("none", "Bodyweight"),
    ("kettlebell", "Kettlebells"),
    ("kettlebells", "Kettlebells"),
    ("band", "Band"),
    ("bands", "Band"),
    ("resistance band", "Band"),
    ("trap bar", "Trapbar"),
    ("hex bar", "Trapbar"),
    ("plate", "Plate"),
    ("medicine ball", "Medicine_Ball"),
    ("stability ball", "Stability_Ball"),
    ("swiss ball", "Stability_Ball"),
    ("bosu", "Bosu_Ball"),
    ("bosu ball", "Bosu_Ball"),
    ("trx", "TRX"),
    ("suspension trainer", "TRX"),
    ("landmine", "Landmine"),
];

impl Default for Vocabulary {
    fn default() -> Self {
        Vocabulary {
            muscle_synonyms: table(MUSCLE_SYNONYMS),
            muscle_groups: set(MUSCLE_GROUPS),
            generic_shoulder: "Shoulders".to_string(),
            shoulder_refinements: vec![
                ShoulderRefinement {
                    isolated_token: "anterior-deltoid".to_string(),
                    label: "Front-Shoulder".to_string(),
                },
                ShoulderRefinement {
                    isolated_token: "lateral-deltoid".to_string(),
                    label: "Middle-Shoulder".to_string(),
                },
                ShoulderRefinement {
                    isolated_token: "posterior-deltoid".to_string(),
                    label: "Rear-Shoulder".to_string(),
                },
            ],
            isolated_synonyms: table(ISOLATED_SYNONYMS),
            isolated_muscles: set(ISOLATED_MUSCLES),
            forbidden_isolated: set(FORBIDDEN_ISOLATED),
            force: table(FORCE),
            mechanic: table(MECHANIC),
            utility: table(UTILITY),
            difficulty: table(DIFFICULTY),
            equipment: table(EQUIPMENT),
            smith_machine: "Smith_Machine".to_string(),
        }
        .normalized()
    }
}

impl Vocabulary {
    /// Load a vocabulary from a JSON file. Tables the file leaves out keep
    /// their built-in contents.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CatalogError::FileNotFound(path.to_path_buf()));
        }
        let contents =
            std::fs::read_to_string(path).map_err(|e| CatalogError::io_with_path(e, path))?;
        let vocab: Vocabulary = serde_json::from_str(&contents).map_err(|e| CatalogError::Json {
            message: format!("Failed to parse vocabulary {}: {}", path.display(), e),
            source: Some(e),
        })?;
        Ok(vocab.normalized())
    }

    /// Re-key every table in lookup form and register canonical values as
    /// their own synonyms.
    pub fn normalized(mut self) -> Self {
        self.muscle_synonyms = rekey(
            &self.muscle_synonyms,
            self.muscle_groups
                .iter()
                .chain(std::iter::once(&self.generic_shoulder)),
        );
        self.isolated_synonyms = rekey(&self.isolated_synonyms, self.isolated_muscles.iter());
        self.forbidden_isolated = self
            .forbidden_isolated
            .iter()
            .map(|v| lookup_key(v))
            .collect();
        for shoulder in &self.shoulder_refinements {
            self.muscle_synonyms
                .entry(lookup_key(&shoulder.label))
                .or_insert_with(|| shoulder.label.clone());
        }
        self.force = rekey(&self.force, std::iter::empty());
        self.mechanic = rekey(&self.mechanic, std::iter::empty());
        self.utility = rekey(&self.utility, std::iter::empty());
        self.difficulty = rekey(&self.difficulty, std::iter::empty());
        let smith = self.smith_machine.clone();
        self.equipment = rekey(&self.equipment, std::iter::once(&smith));
        self
    }

    /// Shoulder label for a deltoid token, if it is one.
    pub fn shoulder_label_for(&self, isolated_token: &str) -> Option<&str> {
        self.shoulder_refinements
            .iter()
            .find(|r| r.isolated_token.eq_ignore_ascii_case(isolated_token))
            .map(|r| r.label.as_str())
    }

    pub fn is_muscle_group(&self, label: &str) -> bool {
        self.muscle_groups.contains(label)
    }

    pub fn is_isolated_muscle(&self, token: &str) -> bool {
        self.isolated_muscles.contains(token)
    }

    pub fn is_forbidden_isolated(&self, token: &str) -> bool {
        self.forbidden_isolated.contains(&lookup_key(token))
    }
}

/// Re-key `source` in lookup form, then add every canonical value (table
/// values plus `extra`) as a synonym for itself.
fn rekey<'a>(
    source: &BTreeMap<String, String>,
    extra: impl Iterator<Item = &'a String>,
) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = source
        .iter()
        .map(|(k, v)| (lookup_key(k), v.clone()))
        .collect();
    let canonical: Vec<String> = source.values().cloned().chain(extra.cloned()).collect();
    for value in canonical {
        out.insert(lookup_key(&value), value);
    }
    out
}
