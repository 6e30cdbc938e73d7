//! Pipeline steps
//!
//! One variant per step kind, discriminated by `name` on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Condition, DateUnit, LogicalType, Pipeline, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum Step {
    Domain(DomainStep),
    AbsoluteValue(AbsoluteValueStep),
    AddMissingDates(AddMissingDatesStep),
    Aggregate(AggregateStep),
    Append(AppendStep),
    Argmax(ExtremumStep),
    Argmin(ExtremumStep),
    CompareText(CompareTextStep),
    Concatenate(ConcatenateStep),
    Convert(ConvertStep),
    Cumsum(CumsumStep),
    Custom(CustomStep),
    CustomSql(CustomSqlStep),
    DateExtract(DateExtractStep),
    Delete(DeleteStep),
    Duplicate(DuplicateStep),
    Duration(DurationStep),
    Evolution(EvolutionStep),
    FillNa(FillNaStep),
    Filter(FilterStep),
    Formula(FormulaStep),
    FromDate(FromDateStep),
    IfThenElse(IfThenElseStep),
    Join(JoinStep),
    Lowercase(ColumnStep),
    MovingAverage(MovingAverageStep),
    Percentage(PercentageStep),
    Pivot(PivotStep),
    Rank(RankStep),
    Rename(RenameStep),
    Replace(ReplaceStep),
    ReplaceText(ReplaceTextStep),
    Rollup(RollupStep),
    Select(SelectStep),
    Sort(SortStep),
    Split(SplitStep),
    Statistics(StatisticsStep),
    Substring(SubstringStep),
    Text(TextStep),
    ToDate(ToDateStep),
    Top(TopStep),
    Totals(TotalsStep),
    Trim(TrimStep),
    UniqueGroups(UniqueGroupsStep),
    Unpivot(UnpivotStep),
    Uppercase(ColumnStep),
}

impl Step {
    pub fn kind(&self) -> StepKind {
        match self {
            Step::Domain(_) => StepKind::Domain,
            Step::AbsoluteValue(_) => StepKind::AbsoluteValue,
            Step::AddMissingDates(_) => StepKind::AddMissingDates,
            Step::Aggregate(_) => StepKind::Aggregate,
            Step::Append(_) => StepKind::Append,
            Step::Argmax(_) => StepKind::Argmax,
            Step::Argmin(_) => StepKind::Argmin,
            Step::CompareText(_) => StepKind::CompareText,
            Step::Concatenate(_) => StepKind::Concatenate,
            Step::Convert(_) => StepKind::Convert,
            Step::Cumsum(_) => StepKind::Cumsum,
            Step::Custom(_) => StepKind::Custom,
            Step::CustomSql(_) => StepKind::CustomSql,
            Step::DateExtract(_) => StepKind::DateExtract,
            Step::Delete(_) => StepKind::Delete,
            Step::Duplicate(_) => StepKind::Duplicate,
            Step::Duration(_) => StepKind::Duration,
            Step::Evolution(_) => StepKind::Evolution,
            Step::FillNa(_) => StepKind::FillNa,
            Step::Filter(_) => StepKind::Filter,
            Step::Formula(_) => StepKind::Formula,
            Step::FromDate(_) => StepKind::FromDate,
            Step::IfThenElse(_) => StepKind::IfThenElse,
            Step::Join(_) => StepKind::Join,
            Step::Lowercase(_) => StepKind::Lowercase,
            Step::MovingAverage(_) => StepKind::MovingAverage,
            Step::Percentage(_) => StepKind::Percentage,
            Step::Pivot(_) => StepKind::Pivot,
            Step::Rank(_) => StepKind::Rank,
            Step::Rename(_) => StepKind::Rename,
            Step::Replace(_) => StepKind::Replace,
            Step::ReplaceText(_) => StepKind::ReplaceText,
            Step::Rollup(_) => StepKind::Rollup,
            Step::Select(_) => StepKind::Select,
            Step::Sort(_) => StepKind::Sort,
            Step::Split(_) => StepKind::Split,
            Step::Statistics(_) => StepKind::Statistics,
            Step::Substring(_) => StepKind::Substring,
            Step::Text(_) => StepKind::Text,
            Step::ToDate(_) => StepKind::ToDate,
            Step::Top(_) => StepKind::Top,
            Step::Totals(_) => StepKind::Totals,
            Step::Trim(_) => StepKind::Trim,
            Step::UniqueGroups(_) => StepKind::UniqueGroups,
            Step::Unpivot(_) => StepKind::Unpivot,
            Step::Uppercase(_) => StepKind::Uppercase,
        }
    }
}

/// Field-less mirror of [`Step`], used as the registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
    Domain,
    AbsoluteValue,
    AddMissingDates,
    Aggregate,
    Append,
    Argmax,
    Argmin,
    CompareText,
    Concatenate,
    Convert,
    Cumsum,
    Custom,
    CustomSql,
    DateExtract,
    Delete,
    Duplicate,
    Duration,
    Evolution,
    FillNa,
    Filter,
    Formula,
    FromDate,
    IfThenElse,
    Join,
    Lowercase,
    MovingAverage,
    Percentage,
    Pivot,
    Rank,
    Rename,
    Replace,
    ReplaceText,
    Rollup,
    Select,
    Sort,
    Split,
    Statistics,
    Substring,
    Text,
    ToDate,
    Top,
    Totals,
    Trim,
    UniqueGroups,
    Unpivot,
    Uppercase,
}

impl StepKind {
    pub const ALL: [StepKind; 46] = [
        StepKind::Domain,
        StepKind::AbsoluteValue,
        StepKind::AddMissingDates,
        StepKind::Aggregate,
        StepKind::Append,
        StepKind::Argmax,
        StepKind::Argmin,
        StepKind::CompareText,
        StepKind::Concatenate,
        StepKind::Convert,
        StepKind::Cumsum,
        StepKind::Custom,
        StepKind::CustomSql,
        StepKind::DateExtract,
        StepKind::Delete,
        StepKind::Duplicate,
        StepKind::Duration,
        StepKind::Evolution,
        StepKind::FillNa,
        StepKind::Filter,
        StepKind::Formula,
        StepKind::FromDate,
        StepKind::IfThenElse,
        StepKind::Join,
        StepKind::Lowercase,
        StepKind::MovingAverage,
        StepKind::Percentage,
        StepKind::Pivot,
        StepKind::Rank,
        StepKind::Rename,
        StepKind::Replace,
        StepKind::ReplaceText,
        StepKind::Rollup,
        StepKind::Select,
        StepKind::Sort,
        StepKind::Split,
        StepKind::Statistics,
        StepKind::Substring,
        StepKind::Text,
        StepKind::ToDate,
        StepKind::Top,
        StepKind::Totals,
        StepKind::Trim,
        StepKind::UniqueGroups,
        StepKind::Unpivot,
        StepKind::Uppercase,
    ];

    /// Wire name, as found in the `name` field of a step
    pub fn as_str(self) -> &'static str {
        match self {
            StepKind::Domain => "domain",
            StepKind::AbsoluteValue => "absolutevalue",
            StepKind::AddMissingDates => "addmissingdates",
            StepKind::Aggregate => "aggregate",
            StepKind::Append => "append",
            StepKind::Argmax => "argmax",
            StepKind::Argmin => "argmin",
            StepKind::CompareText => "comparetext",
            StepKind::Concatenate => "concatenate",
            StepKind::Convert => "convert",
            StepKind::Cumsum => "cumsum",
            StepKind::Custom => "custom",
            StepKind::CustomSql => "customsql",
            StepKind::DateExtract => "dateextract",
            StepKind::Delete => "delete",
            StepKind::Duplicate => "duplicate",
            StepKind::Duration => "duration",
            StepKind::Evolution => "evolution",
            StepKind::FillNa => "fillna",
            StepKind::Filter => "filter",
            StepKind::Formula => "formula",
            StepKind::FromDate => "fromdate",
            StepKind::IfThenElse => "ifthenelse",
            StepKind::Join => "join",
            StepKind::Lowercase => "lowercase",
            StepKind::MovingAverage => "movingaverage",
            StepKind::Percentage => "percentage",
            StepKind::Pivot => "pivot",
            StepKind::Rank => "rank",
            StepKind::Rename => "rename",
            StepKind::Replace => "replace",
            StepKind::ReplaceText => "replacetext",
            StepKind::Rollup => "rollup",
            StepKind::Select => "select",
            StepKind::Sort => "sort",
            StepKind::Split => "split",
            StepKind::Statistics => "statistics",
            StepKind::Substring => "substring",
            StepKind::Text => "text",
            StepKind::ToDate => "todate",
            StepKind::Top => "top",
            StepKind::Totals => "totals",
            StepKind::Trim => "trim",
            StepKind::UniqueGroups => "uniquegroups",
            StepKind::Unpivot => "unpivot",
            StepKind::Uppercase => "uppercase",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown step '{}'", s))
    }
}

/// A sub-pipeline used by join/append: a bare domain name or an inline step list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineRef {
    Domain(String),
    Steps(Vec<Step>),
}

impl PipelineRef {
    pub fn to_pipeline(&self) -> Pipeline {
        match self {
            PipelineRef::Domain(name) => Pipeline::from_domain(name.clone()),
            PipelineRef::Steps(steps) => Pipeline::new(steps.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationFunction {
    Sum,
    Avg,
    Count,
    #[serde(rename = "count distinct")]
    CountDistinct,
    Min,
    Max,
    First,
    Last,
}

impl AggregationFunction {
    /// Output type given the aggregated column type
    pub fn output_type(self, input: LogicalType) -> LogicalType {
        match self {
            AggregationFunction::Avg => LogicalType::Float,
            AggregationFunction::Count | AggregationFunction::CountDistinct => LogicalType::Integer,
            AggregationFunction::Sum if input == LogicalType::Integer => LogicalType::Integer,
            AggregationFunction::Sum => LogicalType::Float,
            _ => input,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregation {
    pub new_columns: Vec<String>,
    pub aggfunction: AggregationFunction,
    pub columns: Vec<String>,
}

impl Aggregation {
    /// `(source column, output column)` pairs
    pub fn pairs(&self) -> Result<Vec<(&str, &str)>, crate::StepError> {
        if self.columns.len() != self.new_columns.len() {
            return Err(crate::StepError::InvalidStep(format!(
                "aggregation has {} columns but {} new column names",
                self.columns.len(),
                self.new_columns.len()
            )));
        }
        Ok(self
            .columns
            .iter()
            .map(String::as_str)
            .zip(self.new_columns.iter().map(String::as_str))
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainStep {
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsoluteValueStep {
    pub column: String,
    pub new_column: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateGranularity {
    Day,
    Month,
    Year,
}

impl DateGranularity {
    pub fn unit(self) -> DateUnit {
        match self {
            DateGranularity::Day => DateUnit::Day,
            DateGranularity::Month => DateUnit::Month,
            DateGranularity::Year => DateUnit::Year,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddMissingDatesStep {
    pub dates_column: String,
    pub dates_granularity: DateGranularity,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStep {
    #[serde(default)]
    pub on: Vec<String>,
    pub aggregations: Vec<Aggregation>,
    #[serde(default)]
    pub keep_original_granularity: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendStep {
    pub pipelines: Vec<PipelineRef>,
}

/// Shared by argmax and argmin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtremumStep {
    pub column: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareTextStep {
    pub new_column_name: String,
    pub str_col_1: String,
    pub str_col_2: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcatenateStep {
    pub columns: Vec<String>,
    #[serde(default)]
    pub separator: String,
    pub new_column_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertStep {
    pub columns: Vec<String>,
    pub data_type: LogicalType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CumsumStep {
    pub to_cumsum: Vec<(String, String)>,
    pub reference_column: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Raw MongoDB stages (a single stage object or an array of stages)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomStep {
    pub query: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomSqlStep {
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DateInfo {
    Year,
    Month,
    Day,
    Week,
    Quarter,
    DayOfWeek,
    DayOfYear,
    IsoYear,
    IsoWeek,
    IsoDayOfWeek,
    Hour,
    Minutes,
    Seconds,
    Milliseconds,
    FirstDayOfYear,
    FirstDayOfMonth,
    FirstDayOfWeek,
    FirstDayOfQuarter,
    FirstDayOfIsoWeek,
    PreviousDay,
    FirstDayOfPreviousYear,
    FirstDayOfPreviousMonth,
    FirstDayOfPreviousWeek,
    FirstDayOfPreviousQuarter,
    FirstDayOfPreviousIsoWeek,
    PreviousYear,
    PreviousMonth,
    PreviousWeek,
    PreviousQuarter,
    PreviousIsoWeek,
}

impl DateInfo {
    pub fn output_type(self) -> LogicalType {
        match self {
            DateInfo::FirstDayOfYear
            | DateInfo::FirstDayOfMonth
            | DateInfo::FirstDayOfWeek
            | DateInfo::FirstDayOfQuarter
            | DateInfo::FirstDayOfIsoWeek
            | DateInfo::PreviousDay
            | DateInfo::FirstDayOfPreviousYear
            | DateInfo::FirstDayOfPreviousMonth
            | DateInfo::FirstDayOfPreviousWeek
            | DateInfo::FirstDayOfPreviousQuarter
            | DateInfo::FirstDayOfPreviousIsoWeek => LogicalType::Date,
            _ => LogicalType::Integer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateExtractStep {
    pub column: String,
    pub date_info: Vec<DateInfo>,
    pub new_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteStep {
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateStep {
    pub column: String,
    pub new_column_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Days,
    Hours,
    Minutes,
    Seconds,
}

impl DurationUnit {
    pub fn seconds(self) -> u32 {
        match self {
            DurationUnit::Days => 86_400,
            DurationUnit::Hours => 3_600,
            DurationUnit::Minutes => 60,
            DurationUnit::Seconds => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationStep {
    pub new_column_name: String,
    pub start_date_column: String,
    pub end_date_column: String,
    pub duration_in: DurationUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EvolutionType {
    VsLastYear,
    VsLastMonth,
    VsLastWeek,
    VsLastDay,
}

impl EvolutionType {
    pub fn unit(self) -> DateUnit {
        match self {
            EvolutionType::VsLastYear => DateUnit::Year,
            EvolutionType::VsLastMonth => DateUnit::Month,
            EvolutionType::VsLastWeek => DateUnit::Week,
            EvolutionType::VsLastDay => DateUnit::Day,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvolutionFormat {
    Abs,
    Pct,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionStep {
    pub date_col: String,
    pub value_col: String,
    pub evolution_type: EvolutionType,
    pub evolution_format: EvolutionFormat,
    #[serde(default)]
    pub index_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column: Option<String>,
}

impl EvolutionStep {
    pub fn output_column(&self) -> String {
        self.new_column.clone().unwrap_or_else(|| match self.evolution_format {
            EvolutionFormat::Abs => format!("{}_EVOL_ABS", self.value_col),
            EvolutionFormat::Pct => format!("{}_EVOL_PCT", self.value_col),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillNaStep {
    pub columns: Vec<String>,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStep {
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormulaStep {
    pub new_column: String,
    pub formula: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FromDateStep {
    pub column: String,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfThenElseStep {
    pub new_column: String,
    #[serde(rename = "if")]
    pub condition: Condition,
    pub then: String,
    #[serde(rename = "else")]
    pub otherwise: ElseBranch,
}

/// Nested `if/then/else` without its own output column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfThenElse {
    #[serde(rename = "if")]
    pub condition: Condition,
    pub then: String,
    #[serde(rename = "else")]
    pub otherwise: ElseBranch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ElseBranch {
    Nested(Box<IfThenElse>),
    Formula(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    #[serde(rename = "left")]
    Left,
    #[serde(rename = "inner")]
    Inner,
    /// Anti-join: left rows without a match
    #[serde(rename = "left outer")]
    LeftOuter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinStep {
    pub right_pipeline: PipelineRef,
    #[serde(rename = "type")]
    pub join_type: JoinType,
    pub on: Vec<(String, String)>,
}

/// Single-column string steps (lowercase, uppercase)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStep {
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovingAverageStep {
    pub value_column: String,
    pub column_to_sort: String,
    pub moving_window: u32,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column_name: Option<String>,
}

impl MovingAverageStep {
    pub fn output_column(&self) -> String {
        self.new_column_name
            .clone()
            .unwrap_or_else(|| format!("{}_MOVING_AVG", self.value_column))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentageStep {
    pub column: String,
    #[serde(default)]
    pub group: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column_name: Option<String>,
}

impl PercentageStep {
    pub fn output_column(&self) -> String {
        self.new_column_name
            .clone()
            .unwrap_or_else(|| format!("{}_PCT", self.column))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotStep {
    pub index: Vec<String>,
    pub column_to_pivot: String,
    pub value_column: String,
    pub agg_function: AggregationFunction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMethod {
    Standard,
    Dense,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankStep {
    pub value_col: String,
    pub order: SortOrder,
    pub method: RankMethod,
    #[serde(default)]
    pub groupby: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column_name: Option<String>,
}

impl RankStep {
    pub fn output_column(&self) -> String {
        self.new_column_name
            .clone()
            .unwrap_or_else(|| format!("{}_RANK", self.value_col))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenameStep {
    pub to_rename: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceStep {
    pub search_column: String,
    pub to_replace: Vec<(Value, Value)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceTextStep {
    pub search_column: String,
    pub old_str: String,
    pub new_str: String,
}

fn default_label_col() -> String {
    "label".to_string()
}

fn default_level_col() -> String {
    "level".to_string()
}

fn default_parent_label_col() -> String {
    "parent".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupStep {
    pub hierarchy: Vec<String>,
    pub aggregations: Vec<Aggregation>,
    #[serde(default)]
    pub groupby: Vec<String>,
    #[serde(default = "default_label_col")]
    pub label_col: String,
    #[serde(default = "default_level_col")]
    pub level_col: String,
    #[serde(default = "default_parent_label_col")]
    pub parent_label_col: String,
}

impl RollupStep {
    /// Hierarchy prefixes from the coarsest level down, followed by the grand total
    pub fn levels(&self) -> Vec<&[String]> {
        let mut levels: Vec<&[String]> = (1..=self.hierarchy.len())
            .map(|depth| &self.hierarchy[..depth])
            .collect();
        levels.push(&self.hierarchy[..0]);
        levels
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStep {
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSort {
    pub column: String,
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortStep {
    pub columns: Vec<ColumnSort>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitStep {
    pub column: String,
    pub delimiter: String,
    pub number_cols_to_keep: u32,
}

impl SplitStep {
    pub fn output_columns(&self) -> Vec<String> {
        (1..=self.number_cols_to_keep)
            .map(|i| format!("{}_{}", self.column, i))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Count,
    Max,
    Min,
    Average,
    Variance,
    #[serde(rename = "standard deviation")]
    StandardDeviation,
}

impl Statistic {
    pub fn column_name(self) -> &'static str {
        match self {
            Statistic::Count => "count",
            Statistic::Max => "max",
            Statistic::Min => "min",
            Statistic::Average => "average",
            Statistic::Variance => "variance",
            Statistic::StandardDeviation => "standard deviation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub nth: u32,
    pub order: u32,
}

impl Quantile {
    pub fn column_name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| format!("{}-th {}-quantile", self.nth, self.order))
    }

    pub fn fraction(&self) -> f64 {
        f64::from(self.nth) / f64::from(self.order)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsStep {
    pub column: String,
    #[serde(default)]
    pub groupby_columns: Vec<String>,
    #[serde(default)]
    pub statistics: Vec<Statistic>,
    #[serde(default)]
    pub quantiles: Vec<Quantile>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubstringStep {
    pub column: String,
    pub start_index: i64,
    pub end_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_column_name: Option<String>,
}

impl SubstringStep {
    pub fn output_column(&self) -> String {
        self.new_column_name
            .clone()
            .unwrap_or_else(|| format!("{}_SUBSTR", self.column))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStep {
    pub new_column: String,
    pub text: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToDateStep {
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopStep {
    pub rank_on: String,
    pub sort: SortOrder,
    pub limit: u64,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalDimension {
    pub total_column: String,
    pub total_rows_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalsStep {
    pub total_dimensions: Vec<TotalDimension>,
    pub aggregations: Vec<Aggregation>,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl TotalsStep {
    /// Every subset of the total dimensions, as bit masks: bit `i` set means
    /// dimension `i` is totalled. The empty subset (detail rows) comes first.
    pub fn combinations(&self) -> Vec<Vec<bool>> {
        let count = self.total_dimensions.len();
        (0..(1usize << count))
            .map(|mask| (0..count).map(|i| mask & (1 << i) != 0).collect())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrimStep {
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniqueGroupsStep {
    pub on: Vec<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnpivotStep {
    #[serde(default)]
    pub keep: Vec<String>,
    pub unpivot: Vec<String>,
    pub unpivot_column_name: String,
    pub value_column_name: String,
    #[serde(default = "default_true")]
    pub dropna: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_match_serde_tags() {
        for kind in StepKind::ALL {
            assert_eq!(kind.as_str().parse::<StepKind>().unwrap(), kind);
        }

        let step: Step = serde_json::from_str(
            r#"{"name": "absolutevalue", "column": "a", "new_column": "b"}"#,
        )
        .unwrap();
        assert_eq!(step.kind(), StepKind::AbsoluteValue);

        let step: Step = serde_json::from_str(
            r#"{"name": "uniquegroups", "on": ["a"]}"#,
        )
        .unwrap();
        assert_eq!(step.kind(), StepKind::UniqueGroups);
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["name"], "uniquegroups");
    }

    #[test]
    fn test_aggregate_deserialization() {
        let step: Step = serde_json::from_str(
            r#"{
                "name": "aggregate",
                "on": ["country"],
                "aggregations": [
                    {"new_columns": ["n"], "aggfunction": "count distinct", "columns": ["city"]}
                ]
            }"#,
        )
        .unwrap();
        let Step::Aggregate(aggregate) = step else {
            panic!("expected aggregate");
        };
        assert!(!aggregate.keep_original_granularity);
        assert_eq!(aggregate.aggregations[0].aggfunction, AggregationFunction::CountDistinct);
        assert_eq!(aggregate.aggregations[0].pairs().unwrap(), vec![("city", "n")]);
    }

    #[test]
    fn test_mismatched_aggregation_pairs() {
        let aggregation = Aggregation {
            new_columns: vec!["a".to_string()],
            aggfunction: AggregationFunction::Sum,
            columns: vec!["x".to_string(), "y".to_string()],
        };
        assert!(aggregation.pairs().is_err());
    }

    #[test]
    fn test_join_reference_forms() {
        let step: Step = serde_json::from_str(
            r#"{"name": "join", "right_pipeline": "other", "type": "left outer", "on": [["id", "id"]]}"#,
        )
        .unwrap();
        let Step::Join(join) = step else { panic!("expected join") };
        assert_eq!(join.join_type, JoinType::LeftOuter);
        assert_eq!(join.right_pipeline.to_pipeline().domain(), Some("other"));

        let step: Step = serde_json::from_str(
            r#"{"name": "append", "pipelines": [[{"name": "domain", "domain": "x"}], "y"]}"#,
        )
        .unwrap();
        let Step::Append(append) = step else { panic!("expected append") };
        assert!(matches!(append.pipelines[0], PipelineRef::Steps(_)));
        assert!(matches!(append.pipelines[1], PipelineRef::Domain(_)));
    }

    #[test]
    fn test_nested_ifthenelse() {
        let step: Step = serde_json::from_str(
            r#"{
                "name": "ifthenelse",
                "new_column": "size",
                "if": {"column": "n", "operator": "gt", "value": 10},
                "then": "'big'",
                "else": {
                    "if": {"column": "n", "operator": "gt", "value": 5},
                    "then": "'medium'",
                    "else": "'small'"
                }
            }"#,
        )
        .unwrap();
        let Step::IfThenElse(ite) = step else { panic!("expected ifthenelse") };
        assert!(matches!(ite.otherwise, ElseBranch::Nested(_)));
    }

    #[test]
    fn test_rollup_levels_and_totals_combinations() {
        let rollup = RollupStep {
            hierarchy: vec!["continent".into(), "country".into(), "city".into()],
            aggregations: vec![],
            groupby: vec![],
            label_col: default_label_col(),
            level_col: default_level_col(),
            parent_label_col: default_parent_label_col(),
        };
        let levels = rollup.levels();
        assert_eq!(levels.len(), 4);
        assert_eq!(levels[0], &["continent".to_string()][..]);
        assert!(levels[3].is_empty());

        let totals = TotalsStep {
            total_dimensions: vec![
                TotalDimension { total_column: "a".into(), total_rows_label: "All a".into() },
                TotalDimension { total_column: "b".into(), total_rows_label: "All b".into() },
            ],
            aggregations: vec![],
            groups: vec![],
        };
        let combos = totals.combinations();
        assert_eq!(combos.len(), 4);
        assert_eq!(combos[0], vec![false, false]);
        assert_eq!(combos[3], vec![true, true]);
    }

    #[test]
    fn test_default_output_columns() {
        let step: Step = serde_json::from_str(
            r#"{"name": "rank", "value_col": "sales", "order": "desc", "method": "dense"}"#,
        )
        .unwrap();
        let Step::Rank(rank) = step else { panic!("expected rank") };
        assert_eq!(rank.output_column(), "sales_RANK");

        let split = SplitStep {
            column: "code".into(),
            delimiter: "-".into(),
            number_cols_to_keep: 2,
        };
        assert_eq!(split.output_columns(), vec!["code_1", "code_2"]);

        let quantile = Quantile { label: None, nth: 1, order: 4 };
        assert_eq!(quantile.column_name(), "1-th 4-quantile");
        assert_eq!(quantile.fraction(), 0.25);
    }
}
