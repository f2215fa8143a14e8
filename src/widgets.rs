//! Text shown by the screen widgets: clock, weather, birthdays, connection
//! status and version label. Presentation is pt-BR.

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Weekday};

use super::model::{Birthday, WeatherData};
use super::network::NetworkStatus;

pub const MAX_BIRTHDAYS: usize = 5;
pub const NO_BIRTHDAYS: &str = "Nenhum aniversário próximo";
pub const BIRTHDAYS_TITLE: &str = "🎂 Próximos Aniversários";
pub const NO_MEDIA: &str = "Nenhuma mídia disponível";
pub const LOADING: &str = "Carregando...";
pub const OFFLINE_TITLE: &str = "Sem conexão com internet";
pub const OFFLINE_DETAILS: &str = "Aguardando reconexão para carregar o conteúdo...";
pub const ERROR_TITLE: &str = "Erro de Conexão";
pub const ERROR_FALLBACK: &str = "Não foi possível conectar ao servidor.";

const MONTHS: [&str; 12] = [
    "janeiro", "fevereiro", "março", "abril", "maio", "junho",
    "julho", "agosto", "setembro", "outubro", "novembro", "dezembro",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockText {
    pub time: String,
    pub weekday: String,
    pub date: String,
}

pub fn clock_text<Tz: TimeZone>(now: &DateTime<Tz>) -> ClockText {
    ClockText {
        time: format!("{:02}:{:02}", now.hour(), now.minute()),
        weekday: weekday_name(now.weekday()).to_string(),
        date: format!("{} de {}", now.day(), MONTHS[now.month0() as usize]),
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "segunda-feira",
        Weekday::Tue => "terça-feira",
        Weekday::Wed => "quarta-feira",
        Weekday::Thu => "quinta-feira",
        Weekday::Fri => "sexta-feira",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeatherText {
    pub temperature: String,
    pub max: String,
    pub min: String,
    pub rain: String,
    pub humidity: String,
    pub condition: String,
    pub city: String,
    pub icon_url: String,
}

pub fn weather_text(weather: &WeatherData) -> WeatherText {
    WeatherText {
        temperature: format!("{}°", weather.temperature),
        max: format!("Máx: {}°C", weather.temp_max),
        min: format!("Mín: {}°C", weather.temp_min),
        rain: format!("Chuva: {}%", weather.rain_chance),
        humidity: format!("Umidade: {}%", weather.humidity),
        condition: weather.weather.clone(),
        city: weather.city.clone(),
        icon_url: format!("http://openweathermap.org/img/wn/{}@2x.png", weather.icon),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BirthdayLine {
    pub name: String,
    pub sector: String,
    /// "Hoje! 🎂" or "DD/MM".
    pub when: String,
    pub is_today: bool,
}

/// The panel shows at most `MAX_BIRTHDAYS` entries in the order served.
pub fn birthday_lines(birthdays: &[Birthday]) -> Vec<BirthdayLine> {
    birthdays
        .iter()
        .take(MAX_BIRTHDAYS)
        .map(|b| BirthdayLine {
            name: b.name.clone(),
            sector: b.sector.clone(),
            when: if b.is_today { "Hoje! 🎂".to_string() } else { day_month(&b.date) },
            is_today: b.is_today,
        })
        .collect()
}

fn day_month(date: &str) -> String {
    date.get(..10)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        .map(|d| format!("{:02}/{:02}", d.day(), d.month()))
        .unwrap_or_else(|| date.to_string())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionBanner {
    pub title: String,
    pub since: Option<String>,
}

/// Nothing while online; a "connection lost" banner while offline.
pub fn connection_banner(status: &NetworkStatus) -> Option<ConnectionBanner> {
    if status.is_online {
        return None;
    }
    Some(ConnectionBanner {
        title: "Conexão Perdida".to_string(),
        since: status.connection_lost_at.map(|t: DateTime<Local>| format!("Desde {}", t.format("%H:%M"))),
    })
}

pub fn version_label(version: &str) -> String {
    if version.is_empty() { "vunknown".to_string() } else { format!("v{}", version) }
}
