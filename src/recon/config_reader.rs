use crate::recon::*;

use std::collections::BTreeMap;

use election_reconcile::normalize::clean_first_name;
use serde::{Deserialize, Serialize};

/// The JSON run configuration. Every key is optional and falls back to the
/// engine defaults.
#[derive(PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// An empty marker turns the cycle filter off.
    #[serde(rename = "electionCycleMarker")]
    pub election_cycle_marker: Option<String>,
    #[serde(rename = "verificationMarkers")]
    pub verification_markers: Option<Vec<String>>,
    #[serde(rename = "noiseFloor")]
    pub noise_floor: Option<u64>,
    #[serde(rename = "dependencySaturationPercent")]
    pub dependency_saturation_percent: Option<f64>,
    #[serde(rename = "strongholdMinDeviation")]
    pub stronghold_min_deviation: Option<f64>,
    #[serde(rename = "strongholdMinMeanShare")]
    pub stronghold_min_mean_share: Option<f64>,
    #[serde(rename = "robbedLimit")]
    pub robbed_limit: Option<usize>,
    #[serde(rename = "dependencyLimit")]
    pub dependency_limit: Option<usize>,
    #[serde(rename = "strongholdLimit")]
    pub stronghold_limit: Option<usize>,
    #[serde(rename = "topVoteGetterLimit")]
    pub top_vote_getter_limit: Option<usize>,
    #[serde(rename = "partyAliases")]
    pub party_aliases: Option<BTreeMap<String, String>>,
    #[serde(rename = "nationalTolerancePercent")]
    pub national_tolerance_percent: Option<f64>,
    #[serde(rename = "partyTolerancePercent")]
    pub party_tolerance_percent: Option<f64>,
    #[serde(rename = "lowTurnoutWarningPercent")]
    pub low_turnout_warning_percent: Option<f64>,
    #[serde(rename = "highTurnoutWarningPercent")]
    pub high_turnout_warning_percent: Option<f64>,
}

impl RunConfig {
    pub fn to_settings(&self, category_overrides: CategoryOverrides) -> EngineSettings {
        let default_settings = EngineSettings::default();
        let default_analysis = default_settings.analysis;
        let default_validation = default_settings.validation;
        EngineSettings {
            normalizer: NormalizerSettings {
                election_cycle_marker: match &self.election_cycle_marker {
                    Some(m) if m.is_empty() => None,
                    Some(m) => Some(m.clone()),
                    None => default_settings.normalizer.election_cycle_marker,
                },
                verification_markers: self
                    .verification_markers
                    .clone()
                    .unwrap_or(default_settings.normalizer.verification_markers),
                category_overrides,
            },
            analysis: AnalysisSettings {
                noise_floor: self.noise_floor.unwrap_or(default_analysis.noise_floor),
                dependency_saturation_percent: self
                    .dependency_saturation_percent
                    .unwrap_or(default_analysis.dependency_saturation_percent),
                stronghold_min_deviation: self
                    .stronghold_min_deviation
                    .unwrap_or(default_analysis.stronghold_min_deviation),
                stronghold_min_mean_share: self
                    .stronghold_min_mean_share
                    .unwrap_or(default_analysis.stronghold_min_mean_share),
                robbed_limit: self.robbed_limit.or(default_analysis.robbed_limit),
                dependency_limit: self.dependency_limit.or(default_analysis.dependency_limit),
                stronghold_limit: self.stronghold_limit.or(default_analysis.stronghold_limit),
                top_vote_getter_limit: self
                    .top_vote_getter_limit
                    .or(default_analysis.top_vote_getter_limit),
            },
            validation: ValidationSettings {
                national_tolerance_percent: self
                    .national_tolerance_percent
                    .unwrap_or(default_validation.national_tolerance_percent),
                party_tolerance_percent: self
                    .party_tolerance_percent
                    .unwrap_or(default_validation.party_tolerance_percent),
                low_turnout_warning: self
                    .low_turnout_warning_percent
                    .unwrap_or(default_validation.low_turnout_warning),
                high_turnout_warning: self
                    .high_turnout_warning_percent
                    .unwrap_or(default_validation.high_turnout_warning),
            },
            party_names: match &self.party_aliases {
                Some(aliases) => PartyNameTable::new(aliases.clone()),
                None => default_settings.party_names,
            },
        }
    }
}

pub fn read_json_file(path: &str) -> ReconResult<JSValue> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(&contents);
    let js: JSValue = serde_json::from_str(contents).context(ParsingJsonSnafu { path })?;
    Ok(js)
}

pub fn read_run_config(path: &str) -> ReconResult<RunConfig> {
    let js = read_json_file(path)?;
    let config: RunConfig = serde_json::from_value(js).context(ParsingJsonSnafu { path })?;
    info!("read_run_config: config: {:?}", config);
    Ok(config)
}

pub fn read_reference_totals(path: &str) -> ReconResult<ReferenceTotals> {
    let js = read_json_file(path)?;
    let totals: ReferenceTotals = serde_json::from_value(js).context(ParsingJsonSnafu { path })?;
    debug!("read_reference_totals: {:?}", totals);
    Ok(totals)
}

/// Reads a JSON object of first name to category (`M`, `K` or `F`). The names
/// are reduced to their lookup form.
pub fn read_category_overrides(path: &str) -> ReconResult<CategoryOverrides> {
    let js = read_json_file(path)?;
    let raw: BTreeMap<String, CandidateCategory> =
        serde_json::from_value(js).context(ParsingJsonSnafu { path })?;
    let mut entries: BTreeMap<String, CandidateCategory> = BTreeMap::new();
    for (name, category) in raw.into_iter() {
        let cleaned = clean_first_name(&name);
        if cleaned.is_empty() {
            warn!("read_category_overrides: ignoring empty name {:?}", name);
            continue;
        }
        entries.insert(cleaned, category);
    }
    info!("read_category_overrides: {} overrides", entries.len());
    Ok(CategoryOverrides::new(entries))
}

pub fn read_settings(
    config_path: &Option<String>,
    category_overrides_path: &Option<String>,
) -> ReconResult<EngineSettings> {
    let config = match config_path {
        Some(p) => read_run_config(p)?,
        None => RunConfig::default(),
    };
    let overrides = match category_overrides_path {
        Some(p) => read_category_overrides(p)?,
        None => CategoryOverrides::default(),
    };
    Ok(config.to_settings(overrides))
}
