use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::contracts::ViewMode;
use crate::models::BillDraft;
use crate::time_utils::validate_timezone;

/// User id recorded on bills when no `--user` is given or remembered.
pub const DEFAULT_USER_ID: &str = "guest";

/// Default Gemini model used for slip extraction.
pub const DEFAULT_OCR_MODEL: &str = "gemini-2.5-flash";

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Record electricity bills and compare their daily cost
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bill-tracker",
    about = "Record electricity bills and compare their daily cost",
    version
)]
pub struct Settings {
    /// User id that owns new records
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Name shown as the recorder of new records
    #[arg(long, global = true)]
    pub recorder_name: Option<String>,

    /// Administrative mode: see every user's records
    #[arg(long, global = true)]
    pub admin: bool,

    /// View mode
    #[arg(long, global = true, default_value = "all", value_parser = ["all", "alpha", "toukijibetsu", "combined"])]
    pub view: String,

    /// Only show records whose contract type contains this text (overrides --view)
    #[arg(long, global = true)]
    pub contract: Option<String>,

    /// Only show records of this recorder (administrators only)
    #[arg(long, global = true)]
    pub recorder: Option<String>,

    /// Directory holding the bill store and history log
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Timezone used for record dates (auto-detected if not specified)
    #[arg(long, global = true, default_value = "auto", value_parser = parse_timezone)]
    pub timezone: String,

    /// Display theme
    #[arg(long, global = true, default_value = "auto", value_parser = ["light", "dark", "classic", "auto"])]
    pub theme: String,

    /// Logging level
    #[arg(long, global = true, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long, global = true)]
    pub clear: bool,

    /// Gemini API key for slip extraction
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini model used for slip extraction
    #[arg(long, global = true, default_value = DEFAULT_OCR_MODEL)]
    pub ocr_model: String,

    /// Attempts made against the OCR service before giving up (1-10)
    #[arg(long, global = true, default_value = "5", value_parser = clap::value_parser!(u32).range(1..=10))]
    pub ocr_max_retries: u32,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Actions offered by the command line.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Record a bill entered by hand
    Add(DraftArgs),
    /// Read a meter-reading slip photo and fill a bill from it
    Scan {
        /// Photo of the slip (jpg, png, webp, heic)
        image: PathBuf,
        /// Save the bill after extraction instead of only showing it
        #[arg(long)]
        save: bool,
        #[command(flatten)]
        overrides: DraftArgs,
    },
    /// Delete a bill by id
    Delete {
        /// Record id as shown by `list`
        id: String,
    },
    /// Show bills in the selected view
    List {
        /// Print a plain text table instead of the interactive view
        #[arg(long)]
        plain: bool,
    },
    /// Show bills and keep the view updated as records change
    Watch,
    /// Compare the latest bill with the historical average
    Compare,
    /// Export the selected view as CSV
    Export {
        /// Output file (defaults to 電気料金履歴_YYYYMMDD.csv)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Normalize a billing-period string
    Normalize {
        text: String,
    },
    /// Show the operation history
    History {
        /// Number of most recent entries to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

/// Bill form fields accepted on the command line.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct DraftArgs {
    /// Contract or plan name, e.g. 低圧電力α
    #[arg(long)]
    pub contract_type: Option<String>,
    /// Billing period, e.g. "R7 6月分" or 令和7年6月分
    #[arg(long)]
    pub billing_date: Option<String>,
    /// Usage in kWh
    #[arg(long)]
    pub usage: Option<String>,
    /// Total cost
    #[arg(long)]
    pub cost: Option<String>,
    /// Days covered by the bill
    #[arg(long)]
    pub days: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

impl DraftArgs {
    /// Overwrite the draft fields that were given on the command line.
    pub fn apply_to(&self, draft: &mut BillDraft) {
        if let Some(v) = &self.contract_type {
            draft.contract_type = v.clone();
        }
        if let Some(v) = &self.billing_date {
            draft.set_billing_date(v);
        }
        if let Some(v) = &self.usage {
            draft.usage_kwh = v.clone();
        }
        if let Some(v) = &self.cost {
            draft.total_cost = v.clone();
        }
        if let Some(v) = &self.days {
            draft.period_days = v.clone();
        }
        if let Some(v) = &self.notes {
            draft.notes = v.clone();
        }
    }
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.bill-tracker/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorder_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl LastUsedParams {
    /// Return the default path to the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Return the config path rooted at `base_dir` (used for testing).
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".bill-tracker").join("last_used.json")
    }

    /// Load persisted params from an explicit path.
    ///
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    /// Delete the config file at an explicit path if it exists.
    pub fn clear_at(path: &std::path::Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

/// Accept `auto` or a known IANA timezone name.
fn parse_timezone(value: &str) -> Result<String, String> {
    if value == "auto" || validate_timezone(value) {
        Ok(value.to_string())
    } else {
        Err(format!("unknown timezone \"{value}\" (use an IANA name such as Asia/Tokyo, or auto)"))
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments, merge with last-used params where no explicit CLI
    /// value was provided, and persist the result.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Full implementation; accepts args and an explicit config path so that
    /// tests can redirect to a temporary directory.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = <Settings as CommandFactory>::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            let _ = LastUsedParams::clear_at(config_path);
            return Self::resolve_auto_values(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins; the admin flag and API key are never remembered.
        if !is_arg_explicitly_set(&matches, "view") {
            if let Some(v) = last.view {
                settings.view = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "theme") {
            if let Some(v) = last.theme {
                settings.theme = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone {
                settings.timezone = v;
            }
        }
        if settings.user.is_none() {
            settings.user = last.user;
        }
        if settings.recorder_name.is_none() {
            settings.recorder_name = last.recorder_name;
        }
        if settings.data_dir.is_none() {
            settings.data_dir = last.data_dir;
        }

        settings = Self::resolve_auto_values(settings);

        let params = LastUsedParams::from(&settings);
        let _ = params.save_to(config_path);

        settings
    }

    /// Apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }
        settings
    }

    /// The view mode selected by `--contract` or `--view`.
    pub fn view_mode(&self) -> ViewMode {
        if let Some(token) = self.contract.as_deref().filter(|t| !t.is_empty()) {
            return ViewMode::FilterByContractSubstring(token.to_string());
        }
        self.view.parse().unwrap_or_default()
    }

    /// Owner id for new records and the default subscription filter.
    pub fn user_id(&self) -> &str {
        self.user.as_deref().unwrap_or(DEFAULT_USER_ID)
    }

    /// Recorder filter, honoured for administrators only.
    pub fn recorder_filter(&self) -> Option<&str> {
        if self.admin {
            self.recorder.as_deref()
        } else {
            None
        }
    }

    /// Directory of the bill store (`~/.bill-tracker/data` by default).
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".bill-tracker")
                .join("data")
        })
    }

    /// The subcommand to run; a bare invocation lists bills.
    pub fn subcommand(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::List { plain: false })
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            view: Some(s.view.clone()),
            theme: Some(s.theme.clone()),
            timezone: Some(s.timezone.clone()),
            user: s.user.clone(),
            recorder_name: s.recorder_name.clone(),
            data_dir: s.data_dir.clone(),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tmp_config_path(tmp: &TempDir) -> PathBuf {
        LastUsedParams::config_path_in(tmp.path())
    }

    #[test]
    fn test_last_used_params_save_load() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        let params = LastUsedParams {
            view: Some("combined".to_string()),
            theme: Some("dark".to_string()),
            timezone: Some("Asia/Tokyo".to_string()),
            user: Some("uid-7".to_string()),
            recorder_name: Some("山田".to_string()),
            data_dir: Some(PathBuf::from("/tmp/bills")),
        };
        params.save_to(&path).expect("save");
        assert_eq!(LastUsedParams::load_from(&path), params);
    }

    #[test]
    fn test_last_used_params_clear() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&path).expect("save");
        assert!(path.exists());
        LastUsedParams::clear_at(&path).expect("clear");
        assert!(!path.exists());
    }

    #[test]
    fn test_last_used_params_default_when_corrupt() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp_config_path(&tmp);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(LastUsedParams::load_from(&path), LastUsedParams::default());
    }

    #[test]
    fn test_settings_default_values() {
        let settings = Settings::parse_from(["bill-tracker"]);
        assert_eq!(settings.view, "all");
        assert_eq!(settings.theme, "auto");
        assert_eq!(settings.timezone, "auto");
        assert_eq!(settings.log_level, "INFO");
        assert_eq!(settings.ocr_model, DEFAULT_OCR_MODEL);
        assert_eq!(settings.ocr_max_retries, 5);
        assert!(!settings.admin);
        assert!(settings.command.is_none());
        assert_eq!(settings.subcommand(), Command::List { plain: false });
        assert_eq!(settings.user_id(), DEFAULT_USER_ID);
        assert_eq!(settings.view_mode(), ViewMode::AllRecords);
    }

    #[test]
    fn test_contract_overrides_view() {
        let settings = Settings::parse_from([
            "bill-tracker",
            "--view",
            "combined",
            "--contract",
            "従量",
        ]);
        assert_eq!(
            settings.view_mode(),
            ViewMode::FilterByContractSubstring("従量".to_string())
        );
    }

    #[test]
    fn test_recorder_filter_requires_admin() {
        let settings = Settings::parse_from(["bill-tracker", "--recorder", "山田"]);
        assert_eq!(settings.recorder_filter(), None);
        let settings = Settings::parse_from(["bill-tracker", "--admin", "--recorder", "山田"]);
        assert_eq!(settings.recorder_filter(), Some("山田"));
    }

    #[test]
    fn test_add_subcommand_parsing() {
        let settings = Settings::parse_from([
            "bill-tracker",
            "add",
            "--contract-type",
            "低圧電力α",
            "--billing-date",
            "令和7年6月分",
            "--usage",
            "350.5",
            "--cost",
            "12500",
            "--days",
            "30",
        ]);
        let Some(Command::Add(args)) = settings.command else {
            panic!("expected add command");
        };
        let mut draft = BillDraft::new(Some("山田"));
        args.apply_to(&mut draft);
        assert_eq!(draft.contract_type, "低圧電力α");
        assert_eq!(draft.billing_date, "R7 6月分");
        assert_eq!(draft.usage_kwh, "350.5");
        assert_eq!(draft.notes, "");
    }

    #[test]
    fn test_global_flag_after_subcommand() {
        let settings = Settings::parse_from(["bill-tracker", "list", "--plain", "--view", "alpha"]);
        assert_eq!(settings.subcommand(), Command::List { plain: true });
        assert_eq!(settings.view, "alpha");
    }

    #[test]
    fn test_scan_subcommand_parsing() {
        let settings = Settings::parse_from(["bill-tracker", "scan", "slip.jpg", "--save"]);
        match settings.subcommand() {
            Command::Scan {
                image,
                save,
                overrides,
            } => {
                assert_eq!(image, PathBuf::from("slip.jpg"));
                assert!(save);
                assert_eq!(overrides, DraftArgs::default());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_load_with_last_used_merges_persisted_values() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            view: Some("combined".to_string()),
            user: Some("uid-7".to_string()),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = Settings::load_with_last_used_impl(vec!["bill-tracker".into()], &config_path);
        assert_eq!(settings.view, "combined");
        assert_eq!(settings.user_id(), "uid-7");
    }

    #[test]
    fn test_load_with_last_used_cli_overrides_persisted() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams {
            view: Some("combined".to_string()),
            ..Default::default()
        }
        .save_to(&config_path)
        .expect("save");

        let settings = Settings::load_with_last_used_impl(
            vec!["bill-tracker".into(), "--view".into(), "alpha".into()],
            &config_path,
        );
        assert_eq!(settings.view, "alpha");
    }

    #[test]
    fn test_load_with_last_used_parses_subcommand_and_persists() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);

        let settings = Settings::load_with_last_used_impl(
            vec![
                "bill-tracker".into(),
                "export".into(),
                "-o".into(),
                "out.csv".into(),
                "--timezone".into(),
                "Asia/Tokyo".into(),
            ],
            &config_path,
        );
        assert_eq!(
            settings.subcommand(),
            Command::Export {
                output: Some(PathBuf::from("out.csv"))
            }
        );
        assert_eq!(
            LastUsedParams::load_from(&config_path).timezone.as_deref(),
            Some("Asia/Tokyo")
        );
    }

    #[test]
    fn test_timezone_flag_is_validated() {
        assert!(Settings::try_parse_from(["bill-tracker", "--timezone", "Asia/Tokyo"]).is_ok());
        assert!(Settings::try_parse_from(["bill-tracker", "--timezone", "auto"]).is_ok());
        assert!(Settings::try_parse_from(["bill-tracker", "--timezone", "Mars/Olympus"]).is_err());
    }

    #[test]
    fn test_load_with_last_used_clear_removes_file() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        LastUsedParams::default().save_to(&config_path).expect("save");

        Settings::load_with_last_used_impl(
            vec!["bill-tracker".into(), "--clear".into()],
            &config_path,
        );
        assert!(!config_path.exists());
    }

    #[test]
    fn test_load_with_last_used_debug_overrides_log_level() {
        let tmp = TempDir::new().expect("tempdir");
        let settings = Settings::load_with_last_used_impl(
            vec!["bill-tracker".into(), "--debug".into()],
            &tmp_config_path(&tmp),
        );
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn test_load_with_last_used_persists_after_run() {
        let tmp = TempDir::new().expect("tempdir");
        let config_path = tmp_config_path(&tmp);
        Settings::load_with_last_used_impl(
            vec![
                "bill-tracker".into(),
                "--theme".into(),
                "classic".into(),
                "--user".into(),
                "uid-3".into(),
            ],
            &config_path,
        );
        let loaded = LastUsedParams::load_from(&config_path);
        assert_eq!(loaded.theme, Some("classic".to_string()));
        assert_eq!(loaded.user, Some("uid-3".to_string()));
    }
}
