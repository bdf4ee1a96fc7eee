use chrono::{Datelike, NaiveDate};

use crate::models::DailyLog;

/// Where today's calories stand against the daily goal.
#[derive(Debug, Clone, PartialEq)]
pub struct GoalProgress {
    pub current: u32,
    pub goal: u32,
    /// Capped at 100.
    pub percentage: f64,
    pub remaining: u32,
}

impl GoalProgress {
    pub fn new(current: u32, goal: u32) -> Self {
        let percentage = if goal == 0 {
            100.0
        } else {
            (current as f64 / goal as f64 * 100.0).min(100.0)
        };

        Self {
            current,
            goal,
            percentage,
            remaining: goal.saturating_sub(current),
        }
    }

    pub fn status_text(&self) -> &'static str {
        if self.percentage < 50.0 {
            "Keep going!"
        } else if self.percentage < 75.0 {
            "Good progress!"
        } else if self.percentage < 100.0 {
            "Almost there!"
        } else {
            "Goal achieved! 🎉"
        }
    }
}

pub fn format_goal_bar(progress: &GoalProgress) -> String {
    format!(
        "🎯 Daily Calorie Goal\n\
         {}\n\
         {}/{} kcal ({:.0}%)\n\
         {} kcal remaining · {}",
        create_progress_bar(progress.percentage),
        progress.current,
        progress.goal,
        progress.percentage,
        progress.remaining,
        progress.status_text()
    )
}

fn create_progress_bar(percentage: f64) -> String {
    let filled = ((percentage / 10.0) as usize).min(10); // 10 cells
    let empty = 10 - filled;

    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

/// Calendar heat-map buckets for one day's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalorieLevel {
    None,
    Low,
    Moderate,
    Good,
    High,
}

impl CalorieLevel {
    pub fn for_calories(calories: u32) -> Self {
        match calories {
            0 => CalorieLevel::None,
            1..=999 => CalorieLevel::Low,
            1000..=1499 => CalorieLevel::Moderate,
            1500..=1999 => CalorieLevel::Good,
            _ => CalorieLevel::High,
        }
    }

    fn marker(self) -> char {
        match self {
            CalorieLevel::None => '·',
            CalorieLevel::Low => '░',
            CalorieLevel::Moderate => '▒',
            CalorieLevel::Good => '▓',
            CalorieLevel::High => '█',
        }
    }
}

pub fn calories_for_date(logs: &[DailyLog], date: NaiveDate) -> u32 {
    logs.iter()
        .find(|log| log.date == date)
        .map(DailyLog::calories)
        .unwrap_or(0)
}

/// Renders the month containing `month` as a Sunday-first grid, each day
/// tagged with its calorie level.
pub fn format_month_calendar(logs: &[DailyLog], month: NaiveDate) -> String {
    let first = month.with_day(1).unwrap_or(month);
    let days_in_month = days_in_month(first);

    let mut out = format!("📅 {}\n", first.format("%B %Y"));
    out.push_str("  Su   Mo   Tu   We   Th   Fr   Sa\n");

    let leading = first.weekday().num_days_from_sunday() as usize;
    let mut cells: Vec<String> = vec!["     ".to_string(); leading];

    let mut month_total = 0;
    let mut logged_days = 0;
    for day in 1..=days_in_month {
        let Some(date) = first.with_day(day) else {
            continue;
        };
        let calories = calories_for_date(logs, date);
        if calories > 0 {
            month_total += calories;
            logged_days += 1;
        }
        cells.push(format!(" {:>2}{} ", day, CalorieLevel::for_calories(calories).marker()));
    }

    for week in cells.chunks(7) {
        out.push_str(week.concat().trim_end());
        out.push('\n');
    }

    out.push_str("\n· none  ░ <1000  ▒ <1500  ▓ <2000  █ 2000+\n");
    if logged_days > 0 {
        out.push_str(&format!(
            "Logged {} day(s), average {} kcal",
            logged_days,
            month_total / logged_days
        ));
    } else {
        out.push_str("No food logged this month");
    }
    out
}

fn days_in_month(first: NaiveDate) -> u32 {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|next| next.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}
