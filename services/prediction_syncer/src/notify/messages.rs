//! Localized texts of outbound notifications.
//!
//! Builders return plain text; [`escape_markdown`] is applied right before
//! a message is handed to the notifier.

use chrono::{DateTime, Utc};

use crate::model::{LeaderboardPosition, WeeklyRecap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Ru,
}

impl Language {
    fn from_code(code: &str) -> Option<Self> {
        let primary = code.split(['-', '_']).next().unwrap_or(code);
        match primary.to_ascii_lowercase().as_str() {
            "en" => Some(Language::En),
            "ru" => Some(Language::Ru),
            _ => None,
        }
    }

    /// The user's language when supported, then the configured default,
    /// then English.
    pub fn resolve(user_code: Option<&str>, default_code: &str) -> Self {
        user_code
            .and_then(Language::from_code)
            .or_else(|| Language::from_code(default_code))
            .unwrap_or(Language::En)
    }
}

const MARKDOWN_V2_SPECIAL: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Escapes every character Telegram treats as MarkdownV2 markup.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn match_reminder(language: Language, home: &str, away: &str) -> String {
    match language {
        Language::En => format!(
            "⚽ Your favorite team is playing!\n\n{home} vs {away}\n\nMake your prediction and earn points! 🎯"
        ),
        Language::Ru => format!(
            "⚽ Играет ваш любимый клуб!\n\n{home} vs {away}\n\nСделайте прогноз и зарабатывайте очки! 🎯"
        ),
    }
}

pub fn reminder_button(language: Language) -> &'static str {
    match language {
        Language::En => "Make your prediction",
        Language::Ru => "Сделать прогноз",
    }
}

pub fn channel_reminder(
    language: Language,
    home: &str,
    away: &str,
    kickoff: DateTime<Utc>,
) -> String {
    let time = kickoff.format("%H:%M");
    match language {
        Language::En => format!("{home} vs {away} today at {time} UTC, don't forget to make your prediction!"),
        Language::Ru => format!("{home} vs {away} сегодня в {time} UTC, не забудьте сделать прогноз!"),
    }
}

pub fn channel_button(language: Language) -> &'static str {
    match language {
        Language::En => "Place a prediction",
        Language::Ru => "Сделать ставочку",
    }
}

pub fn weekly_recap(
    language: Language,
    recap: &WeeklyRecap,
    position: Option<&LeaderboardPosition>,
) -> String {
    let mut text = match language {
        Language::En => format!(
            "📊 Weekly Recap:\n- Predictions: {}\n- Wins: {}\n- Losses: {}\n- Points: {}\n- Win Streak: {}",
            recap.total_predictions, recap.wins, recap.losses, recap.points, recap.current_streak
        ),
        Language::Ru => format!(
            "📊 Итоги недели:\n- Прогнозов: {}\n- Угадано: {}\n- Не угадано: {}\n- Очки: {}\n- Серия побед: {}",
            recap.total_predictions, recap.wins, recap.losses, recap.points, recap.current_streak
        ),
    };

    if let Some(position) = position {
        let line = match language {
            Language::En => format!(
                "\n- Leaderboard: #{} of {} ({} pts)",
                position.rank, position.participants, position.points
            ),
            Language::Ru => format!(
                "\n- Рейтинг: #{} из {} ({} очков)",
                position.rank, position.participants, position.points
            ),
        };
        text.push_str(&line);
    }
    text
}

pub fn streak_achievement(language: Language, streak: i32, bonus: i32) -> String {
    match language {
        Language::En => format!(
            "🔥 {streak} correct predictions in a row! You earned +{bonus} bonus points."
        ),
        Language::Ru => format!(
            "🔥 {streak} верных прогнозов подряд! Вы получили +{bonus} бонусных очков."
        ),
    }
}
