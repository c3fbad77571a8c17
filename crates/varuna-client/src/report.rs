//! 検証サービスへ送るレポート構成と検証オプション。
//!
//! `jsonConfig` パートとして camelCase の JSON にシリアライズされる。

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::VarunaError;

/// 再帰検証の深さの既定値。
pub const DEFAULT_MAX_RECURSION_DEPTH: u32 = 1;

/// ReportConfiguration は生成するレポート 1 件の種別と言語。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfiguration {
    pub report_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_language: Option<String>,
}

/// ValidationOptions は検証時のプロファイル・基準日時・再帰深さ。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(with = "validation_date_time")]
    pub validation_date_time: NaiveDateTime,
    pub max_recursion_depth: u32,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            profile: None,
            validation_date_time: chrono::Local::now().naive_local(),
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

/// ValidationServiceConfiguration は検証サービスに渡す構成全体。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationServiceConfiguration {
    report_configurations: Vec<ReportConfiguration>,
    validation_options: ValidationOptions,
}

impl ValidationServiceConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report_configurations(&self) -> &[ReportConfiguration] {
        &self.report_configurations
    }

    pub fn validation_options(&self) -> &ValidationOptions {
        &self.validation_options
    }

    /// レポート構成を追加する。
    ///
    /// 言語を `Some` で渡す場合は空にできない。
    pub fn add_report_configuration(
        &mut self,
        report_type: &str,
        report_language: Option<&str>,
    ) -> Result<(), VarunaError> {
        if report_type.trim().is_empty() {
            return Err(VarunaError::InvalidArgument(
                "reportType が空です".to_string(),
            ));
        }
        if report_language.is_some_and(|l| l.trim().is_empty()) {
            return Err(VarunaError::InvalidArgument(
                "reportLanguage が空です".to_string(),
            ));
        }

        self.report_configurations.push(ReportConfiguration {
            report_type: report_type.to_string(),
            report_language: report_language.map(str::to_string),
        });
        Ok(())
    }

    pub fn set_profile(&mut self, profile: &str) -> Result<(), VarunaError> {
        if profile.trim().is_empty() {
            return Err(VarunaError::InvalidArgument("profile が空です".to_string()));
        }
        self.validation_options.profile = Some(profile.to_string());
        Ok(())
    }

    pub fn set_validation_date_time(&mut self, date_time: NaiveDateTime) {
        self.validation_options.validation_date_time = date_time;
    }

    pub fn set_max_recursion_depth(&mut self, depth: u32) -> Result<(), VarunaError> {
        if depth < 1 {
            return Err(VarunaError::InvalidArgument(
                "maxRecursionDepth は 1 以上である必要があります".to_string(),
            ));
        }
        self.validation_options.max_recursion_depth = depth;
        Ok(())
    }
}

/// `yyyy-MM-ddTHH:mm:ss` 形式での (de)serialize。
mod validation_date_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed_date_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 5)
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = ValidationServiceConfiguration::new();
        assert!(config.report_configurations().is_empty());
        assert_eq!(config.validation_options().max_recursion_depth, 1);
        assert!(config.validation_options().profile.is_none());
    }

    #[test]
    fn test_serializes_camel_case() {
        let mut config = ValidationServiceConfiguration::new();
        config.add_report_configuration("PDF", Some("EN")).unwrap();
        config.add_report_configuration("SVR", None).unwrap();
        config.set_profile("AUTOMATIC").unwrap();
        config.set_validation_date_time(fixed_date_time());
        config.set_max_recursion_depth(3).unwrap();

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "reportConfigurations": [
                    {"reportType": "PDF", "reportLanguage": "EN"},
                    {"reportType": "SVR"}
                ],
                "validationOptions": {
                    "profile": "AUTOMATIC",
                    "validationDateTime": "2024-03-01T12:30:05",
                    "maxRecursionDepth": 3
                }
            })
        );

        let back: ValidationServiceConfiguration = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_invalid_arguments() {
        let mut config = ValidationServiceConfiguration::new();
        assert!(matches!(
            config.add_report_configuration(" ", None),
            Err(VarunaError::InvalidArgument(_))
        ));
        assert!(matches!(
            config.add_report_configuration("PDF", Some("")),
            Err(VarunaError::InvalidArgument(_))
        ));
        assert!(matches!(
            config.set_profile(""),
            Err(VarunaError::InvalidArgument(_))
        ));
        assert!(matches!(
            config.set_max_recursion_depth(0),
            Err(VarunaError::InvalidArgument(_))
        ));
        assert!(config.report_configurations().is_empty());
        assert_eq!(config.validation_options().max_recursion_depth, 1);
    }
}
