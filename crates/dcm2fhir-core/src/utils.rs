//! 通用推导函数
//!
//! 从DICOM原始编码推导FHIR字段值：性别、年龄、日期和引用解析。

use crate::error::{ConvertError, Result};
use crate::models::Gender;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// 未知值占位
pub const UNKNOWN: &str = "unknown";

/// 年龄单位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeUnit {
    Years,
    Months,
    Days,
    Weeks,
    Unknown,
}

impl AgeUnit {
    fn from_code(code: char) -> Self {
        match code.to_ascii_uppercase() {
            'Y' => Self::Years,
            'M' => Self::Months,
            'D' => Self::Days,
            'W' => Self::Weeks,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Years => "years",
            Self::Months => "months",
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Unknown => UNKNOWN,
        }
    }
}

/// 结构化年龄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeInfo {
    pub age: u32,
    pub unit: AgeUnit,
}

/// DICOM性别编码映射到FHIR性别
pub fn gender(sex_code: &str) -> Gender {
    match sex_code {
        "M" => Gender::Male,
        "F" => Gender::Female,
        _ => Gender::Unknown,
    }
}

/// 解析DICOM年龄编码（如 `045Y`）
///
/// 除最后一个字符外均为数值，最后一个字符为单位。
/// 编码为空或短于两个字符时返回错误值，不会panic。
pub fn extract_age(age_code: &str) -> Result<AgeInfo> {
    let unit_char = match age_code.chars().last() {
        Some(c) if age_code.chars().count() >= 2 => c,
        _ => return Err(ConvertError::InvalidAgeCode(age_code.to_string())),
    };

    let magnitude = &age_code[..age_code.len() - unit_char.len_utf8()];
    let age = magnitude
        .trim()
        .parse::<u32>()
        .map_err(|_| ConvertError::InvalidAgeCode(age_code.to_string()))?;

    Ok(AgeInfo {
        age,
        unit: AgeUnit::from_code(unit_char),
    })
}

/// `YYYYMMDD` 转换为 `YYYY-MM-DD`，空值返回 `unknown`
pub fn study_date(date_code: &str) -> String {
    let date_code = date_code.trim();
    if date_code.is_empty() {
        return UNKNOWN.to_string();
    }

    if date_code.len() == 8 && date_code.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &date_code[..4], &date_code[4..6], &date_code[6..])
    } else {
        warn!("无法识别的日期编码: {:?}", date_code);
        UNKNOWN.to_string()
    }
}

/// 拆分 `Type/id` 形式的引用
pub fn split_reference(reference: &str) -> Option<(&str, &str)> {
    let (kind, id) = reference.split_once('/')?;
    if kind.is_empty() || id.is_empty() {
        return None;
    }
    // 带版本的引用 `Type/id/_history/n` 只取id
    let id = id.split('/').next().unwrap_or(id);
    Some((kind, id))
}
