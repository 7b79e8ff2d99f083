//! crates/trustpaws_core/src/wizard.rs
//!
//! The tutor onboarding wizard: eight ordered steps, each contributing one
//! fragment of [`WizardAnswers`]. Nothing is persisted until [`Wizard::finish`]
//! hands back the record to insert.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{NewPetsProfile, PetType};

//=========================================================================================
// Steps
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    PetTypes,
    PetCount,
    PetNeeds,
    Info,
    TravelDates,
    SelectDates,
    TripLength,
    Location,
}

impl WizardStep {
    pub const ALL: [WizardStep; 8] = [
        WizardStep::PetTypes,
        WizardStep::PetCount,
        WizardStep::PetNeeds,
        WizardStep::Info,
        WizardStep::TravelDates,
        WizardStep::SelectDates,
        WizardStep::TripLength,
        WizardStep::Location,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|s| *s == self).unwrap_or(0)
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Steps offering a "Skip" action.
    pub fn can_skip(self) -> bool {
        matches!(
            self,
            WizardStep::TravelDates | WizardStep::SelectDates | WizardStep::TripLength
        )
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WizardStep::PetTypes => "pet_types",
            WizardStep::PetCount => "pet_count",
            WizardStep::PetNeeds => "pet_needs",
            WizardStep::Info => "info",
            WizardStep::TravelDates => "travel_dates",
            WizardStep::SelectDates => "select_dates",
            WizardStep::TripLength => "trip_length",
            WizardStep::Location => "location",
        };
        f.write_str(name)
    }
}

//=========================================================================================
// Fixed catalogs
//=========================================================================================

/// Experience a sitter may need.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetNeed {
    SeniorPets,
    YoungPets,
    Medication,
    ExtraLargeDogs,
    AnxiousCats,
    ExoticAnimals,
    FarmAnimals,
    NoneOfTheAbove,
}

impl PetNeed {
    pub const ALL: [PetNeed; 8] = [
        PetNeed::SeniorPets,
        PetNeed::YoungPets,
        PetNeed::Medication,
        PetNeed::ExtraLargeDogs,
        PetNeed::AnxiousCats,
        PetNeed::ExoticAnimals,
        PetNeed::FarmAnimals,
        PetNeed::NoneOfTheAbove,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PetNeed::SeniorPets => "Senior dogs or cats",
            PetNeed::YoungPets => "Puppies or kittens",
            PetNeed::Medication => "Administering medication",
            PetNeed::ExtraLargeDogs => "Extra large dogs",
            PetNeed::AnxiousCats => "Anxious or nervous cats",
            PetNeed::ExoticAnimals => "Exotic animals",
            PetNeed::FarmAnimals => "Farm animals",
            PetNeed::NoneOfTheAbove => "None of the above",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelDates {
    Know,
    Thinking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripLength {
    AFewDays,
    OneOrTwoWeeks,
    AboutAMonth,
    MoreThanAMonth,
}

impl TripLength {
    pub const ALL: [TripLength; 4] = [
        TripLength::AFewDays,
        TripLength::OneOrTwoWeeks,
        TripLength::AboutAMonth,
        TripLength::MoreThanAMonth,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TripLength::AFewDays => "A few days",
            TripLength::OneOrTwoWeeks => "One or two weeks",
            TripLength::AboutAMonth => "About a month",
            TripLength::MoreThanAMonth => "More than a month",
        }
    }
}

//=========================================================================================
// Step-local pickers
//=========================================================================================

/// An insertion-ordered set where selecting an item twice deselects it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleSet<T> {
    items: Vec<T>,
}

impl<T> Default for ToggleSet<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T: PartialEq> ToggleSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toggle(&mut self, item: T) {
        match self.items.iter().position(|i| *i == item) {
            Some(pos) => {
                self.items.remove(pos);
            }
            None => self.items.push(item),
        }
    }

    pub fn contains(&self, item: &T) -> bool {
        self.items.contains(item)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: PartialEq> FromIterator<T> for ToggleSet<T> {
    /// Collects distinct items, keeping the first occurrence of each.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for item in iter {
            if !set.contains(&item) {
                set.items.push(item);
            }
        }
        set
    }
}

/// Step 0 can only continue once at least one pet type is picked.
pub fn can_continue_pet_types(selected: &ToggleSet<PetType>) -> bool {
    !selected.is_empty()
}

/// Step 7 can only finish once a location has been typed.
pub fn can_finish(location: &str) -> bool {
    !location.is_empty()
}

/// Per-species counters for step 1. Counts never drop below one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PetCounter {
    counts: BTreeMap<PetType, u32>,
}

impl PetCounter {
    /// Starts every selected type at one.
    pub fn for_types(types: &[PetType]) -> Self {
        Self {
            counts: types.iter().map(|t| (*t, 1)).collect(),
        }
    }

    pub fn get(&self, pet_type: PetType) -> Option<u32> {
        self.counts.get(&pet_type).copied()
    }

    pub fn increment(&mut self, pet_type: PetType) {
        if let Some(count) = self.counts.get_mut(&pet_type) {
            *count = count.saturating_add(1);
        }
    }

    pub fn decrement(&mut self, pet_type: PetType) {
        if let Some(count) = self.counts.get_mut(&pet_type) {
            *count = count.saturating_sub(1).max(1);
        }
    }

    pub fn set(&mut self, pet_type: PetType, value: u32) {
        if let Some(count) = self.counts.get_mut(&pet_type) {
            *count = value.max(1);
        }
    }

    pub fn can_decrement(&self, pet_type: PetType) -> bool {
        self.get(pet_type).is_some_and(|c| c > 1)
    }

    pub fn counts(&self) -> &BTreeMap<PetType, u32> {
        &self.counts
    }

    pub fn into_counts(self) -> BTreeMap<PetType, u32> {
        self.counts
    }
}

//=========================================================================================
// Month/year window (step 5)
//=========================================================================================

const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Months shown per page of the month grid.
pub const MONTHS_PER_PAGE: u32 = 6;

/// A calendar month. `month` is zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthYear {
    pub year: i32,
    pub month: u32,
}

impl MonthYear {
    pub fn new(year: i32, month: u32) -> Self {
        Self {
            year: year + (month / 12) as i32,
            month: month % 12,
        }
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self::new(date.year(), date.month0())
    }

    /// Moves by `months`, carrying into the year.
    pub fn shifted(self, months: i32) -> Self {
        let total = self.year * 12 + self.month as i32 + months;
        Self {
            year: total.div_euclid(12),
            month: total.rem_euclid(12) as u32,
        }
    }
}

impl fmt::Display for MonthYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", MONTH_LABELS[self.month as usize], self.year)
    }
}

impl FromStr for MonthYear {
    type Err = WizardError;

    /// Parses labels such as `"Mar 2025"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WizardError::InvalidMonth(s.to_string());
        let (name, year) = s.split_once(' ').ok_or_else(invalid)?;
        let month = MONTH_LABELS
            .iter()
            .position(|m| *m == name)
            .ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        Ok(Self::new(year, month as u32))
    }
}

/// A page of six consecutive months that never starts before the current month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    start: MonthYear,
    earliest: MonthYear,
}

impl MonthWindow {
    pub fn starting_at(current: MonthYear) -> Self {
        Self {
            start: current,
            earliest: current,
        }
    }

    pub fn months(&self) -> Vec<MonthYear> {
        (0..MONTHS_PER_PAGE as i32)
            .map(|i| self.start.shifted(i))
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.months().iter().map(ToString::to_string).collect()
    }

    pub fn can_go_back(&self) -> bool {
        self.start > self.earliest
    }

    /// Whether `month` may still be picked, i.e. is not before the current month.
    pub fn allows(&self, month: MonthYear) -> bool {
        month >= self.earliest
    }

    /// Moves the floor up to `current` when the calendar has moved on, pulling
    /// the page along if it now starts in the past.
    pub fn catch_up(&mut self, current: MonthYear) {
        if current > self.earliest {
            self.earliest = current;
            self.start = self.start.max(current);
        }
    }

    pub fn next_page(&mut self) {
        self.start = self.start.shifted(MONTHS_PER_PAGE as i32);
    }

    pub fn previous_page(&mut self) {
        if self.can_go_back() {
            self.start = self.start.shifted(-(MONTHS_PER_PAGE as i32)).max(self.earliest);
        }
    }
}

//=========================================================================================
// Answers and transitions
//=========================================================================================

/// Everything the wizard has collected so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WizardAnswers {
    pub pet_types: Vec<PetType>,
    pub pet_count: BTreeMap<PetType, u32>,
    pub pet_needs: Vec<PetNeed>,
    pub travel_dates: Option<TravelDates>,
    pub select_dates: Vec<String>,
    pub trip_length: Option<TripLength>,
    pub location: String,
}

/// The fragment submitted by "Continue" on one step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "step", content = "value", rename_all = "snake_case")]
pub enum StepAnswer {
    PetTypes(Vec<PetType>),
    PetCount(BTreeMap<PetType, u32>),
    PetNeeds(Vec<PetNeed>),
    Info,
    TravelDates(TravelDates),
    SelectDates(Vec<String>),
    TripLength(TripLength),
}

impl StepAnswer {
    pub fn step(&self) -> WizardStep {
        match self {
            StepAnswer::PetTypes(_) => WizardStep::PetTypes,
            StepAnswer::PetCount(_) => WizardStep::PetCount,
            StepAnswer::PetNeeds(_) => WizardStep::PetNeeds,
            StepAnswer::Info => WizardStep::Info,
            StepAnswer::TravelDates(_) => WizardStep::TravelDates,
            StepAnswer::SelectDates(_) => WizardStep::SelectDates,
            StepAnswer::TripLength(_) => WizardStep::TripLength,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WizardError {
    #[error("answer for step {got} submitted while on step {expected}")]
    WrongStep { expected: WizardStep, got: WizardStep },
    #[error("select at least one pet type")]
    NoPetTypes,
    #[error("missing count for {0}")]
    MissingCount(PetType),
    #[error("{0} was not selected as a pet type")]
    UnexpectedCount(PetType),
    #[error("pet counts must be at least 1")]
    ZeroCount,
    #[error("select at least one month")]
    NoMonths,
    #[error("'{0}' is not a month label")]
    InvalidMonth(String),
    #[error("{0} is in the past")]
    PastMonth(String),
    #[error("step {0} cannot be skipped")]
    SkipNotAllowed(WizardStep),
    #[error("the last step is completed with finish")]
    UseFinish,
    #[error("finish is only available on the location step")]
    NotOnLastStep,
    #[error("enter a location")]
    EmptyLocation,
}

/// The onboarding wizard's state: the current step, the answers so far, and the
/// month grid's page.
#[derive(Debug, Clone)]
pub struct Wizard {
    step: WizardStep,
    answers: WizardAnswers,
    months: MonthWindow,
}

impl Wizard {
    /// A fresh wizard whose month grid starts at the month containing `today`.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            step: WizardStep::PetTypes,
            answers: WizardAnswers::default(),
            months: MonthWindow::starting_at(MonthYear::containing(today)),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn answers(&self) -> &WizardAnswers {
        &self.answers
    }

    pub fn month_window(&self) -> &MonthWindow {
        &self.months
    }

    pub fn month_window_mut(&mut self) -> &mut MonthWindow {
        &mut self.months
    }

    /// Keeps the month grid from offering months that ended since the wizard started.
    pub fn set_today(&mut self, today: NaiveDate) {
        self.months.catch_up(MonthYear::containing(today));
    }

    /// One-based step number and the total, for the progress bar.
    pub fn progress(&self) -> (usize, usize) {
        (self.step.index() + 1, WizardStep::COUNT)
    }

    /// Counters shown when entering step 1, one per selected type.
    pub fn count_form(&self) -> PetCounter {
        PetCounter::for_types(&self.answers.pet_types)
    }

    /// Merges the fragment and advances one step.
    pub fn next(&mut self, answer: StepAnswer) -> Result<WizardStep, WizardError> {
        if self.step == WizardStep::Location {
            return Err(WizardError::UseFinish);
        }
        if answer.step() != self.step {
            return Err(WizardError::WrongStep {
                expected: self.step,
                got: answer.step(),
            });
        }

        match answer {
            StepAnswer::PetTypes(types) => {
                let types: ToggleSet<PetType> = types.into_iter().collect();
                if !can_continue_pet_types(&types) {
                    return Err(WizardError::NoPetTypes);
                }
                self.answers.pet_types = types.into_vec();
            }
            StepAnswer::PetCount(counts) => {
                self.answers.pet_count = self.validate_counts(counts)?;
            }
            StepAnswer::PetNeeds(needs) => {
                let needs: ToggleSet<PetNeed> = needs.into_iter().collect();
                self.answers.pet_needs = needs.into_vec();
            }
            StepAnswer::Info => {}
            StepAnswer::TravelDates(choice) => {
                self.answers.travel_dates = Some(choice);
            }
            StepAnswer::SelectDates(labels) => {
                let labels: ToggleSet<String> = labels.into_iter().collect();
                if labels.is_empty() {
                    return Err(WizardError::NoMonths);
                }
                for label in labels.as_slice() {
                    let month = label.parse::<MonthYear>()?;
                    if !self.months.allows(month) {
                        return Err(WizardError::PastMonth(label.clone()));
                    }
                }
                self.answers.select_dates = labels.into_vec();
            }
            StepAnswer::TripLength(length) => {
                self.answers.trip_length = Some(length);
            }
        }

        self.advance();
        Ok(self.step)
    }

    /// "Skip" on an optional step: stores an empty fragment and advances one step.
    pub fn skip(&mut self) -> Result<WizardStep, WizardError> {
        match self.step {
            WizardStep::TravelDates => self.answers.travel_dates = None,
            WizardStep::SelectDates => self.answers.select_dates.clear(),
            WizardStep::TripLength => self.answers.trip_length = None,
            other => return Err(WizardError::SkipNotAllowed(other)),
        }
        self.advance();
        Ok(self.step)
    }

    /// Steps back, never below the first step. Later answers are kept.
    pub fn back(&mut self) -> WizardStep {
        let index = self.step.index().saturating_sub(1);
        self.step = WizardStep::from_index(index).unwrap_or(WizardStep::PetTypes);
        self.step
    }

    /// Completes the wizard from the location step, returning the record to persist.
    ///
    /// The wizard keeps its state; callers discard it once the write succeeds.
    pub fn finish(
        &mut self,
        location: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<NewPetsProfile, WizardError> {
        if self.step != WizardStep::Location {
            return Err(WizardError::NotOnLastStep);
        }
        if !can_finish(location) {
            return Err(WizardError::EmptyLocation);
        }
        self.answers.location = location.to_string();
        Ok(NewPetsProfile {
            user_id,
            pet_types: self.answers.pet_types.clone(),
            pet_count: self.answers.pet_count.clone(),
            location: self.answers.location.clone(),
            created_at: now,
        })
    }

    fn advance(&mut self) {
        let index = (self.step.index() + 1).min(WizardStep::COUNT - 1);
        self.step = WizardStep::from_index(index).unwrap_or(WizardStep::Location);
    }

    fn validate_counts(
        &self,
        counts: BTreeMap<PetType, u32>,
    ) -> Result<BTreeMap<PetType, u32>, WizardError> {
        if let Some(extra) = counts
            .keys()
            .find(|t| !self.answers.pet_types.contains(t))
        {
            return Err(WizardError::UnexpectedCount(*extra));
        }
        for pet_type in &self.answers.pet_types {
            match counts.get(pet_type) {
                None => return Err(WizardError::MissingCount(*pet_type)),
                Some(0) => return Err(WizardError::ZeroCount),
                Some(_) => {}
            }
        }
        Ok(counts)
    }
}
