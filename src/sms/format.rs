//! 展示辅助：HTML 转义、预览截断、相对时间

use chrono::{NaiveDate, NaiveDateTime};

/// 会话列表预览最大字符数
pub const PREVIEW_MAX_CHARS: usize = 40;
/// 记录面板历史预览最大字符数
pub const HISTORY_PREVIEW_MAX_CHARS: usize = 100;
/// 截断后缀
pub const ELLIPSIS: &str = "...";

/// 转义用户输入文本，防止 XSS
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// 按字符截断，超出时追加省略号
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", n, unit)
    }
}

/// 相对时间标签（"just now"、"5 minutes ago"、"yesterday" 等）
pub fn relative_time(then: NaiveDateTime, now: NaiveDateTime) -> String {
    let secs = (now - then).num_seconds();
    if secs < 60 {
        // 未来时间（时钟偏差）也按刚刚处理
        return "just now".to_string();
    }
    let minutes = secs / 60;
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return plural(hours, "hour");
    }
    let days = (now.date() - then.date()).num_days().max(1);
    match days {
        1 => "yesterday".to_string(),
        d if d < 7 => plural(d, "day"),
        d if d < 31 => plural(d / 7, "week"),
        d if d < 365 => plural(d / 30, "month"),
        d => plural(d / 365, "year"),
    }
}

/// 可选时间的相对标签，缺失时为空串
pub fn relative_time_opt(then: Option<NaiveDateTime>, now: NaiveDateTime) -> String {
    then.map(|t| relative_time(t, now)).unwrap_or_default()
}

/// 消息时间（HH:MM）
pub fn time_of_day(dt: NaiveDateTime) -> String {
    dt.format("%H:%M").to_string()
}

/// 日期分隔条标签
pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    match (today - day).num_days() {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        _ => day.format("%a, %d %b %Y").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<img src=x onerror="alert('1')">&"#),
            "&lt;img src=x onerror=&quot;alert(&#39;1&#39;)&quot;&gt;&amp;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn preview_truncation_boundary() {
        let exactly_40 = "a".repeat(40);
        assert_eq!(truncate_preview(&exactly_40, PREVIEW_MAX_CHARS), exactly_40);

        let long = format!("{}tail", "b".repeat(40));
        assert_eq!(
            truncate_preview(&long, PREVIEW_MAX_CHARS),
            format!("{}...", "b".repeat(40))
        );

        // 多字节字符按字符计数
        let wide = "é".repeat(41);
        let out = truncate_preview(&wide, PREVIEW_MAX_CHARS);
        assert_eq!(out.chars().count(), 43);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn relative_labels() {
        let now = at("2024-05-10 12:00:00");
        assert_eq!(relative_time(now - Duration::seconds(5), now), "just now");
        assert_eq!(relative_time(now + Duration::seconds(30), now), "just now");
        assert_eq!(relative_time(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(relative_time(now - Duration::minutes(5), now), "5 minutes ago");
        assert_eq!(relative_time(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(relative_time(at("2024-05-09 08:00:00"), now), "yesterday");
        assert_eq!(relative_time(at("2024-05-07 08:00:00"), now), "3 days ago");
        assert_eq!(relative_time(at("2024-04-26 08:00:00"), now), "2 weeks ago");
        assert_eq!(relative_time(at("2024-02-10 08:00:00"), now), "3 months ago");
        assert_eq!(relative_time(at("2022-05-10 08:00:00"), now), "2 years ago");
    }

    #[test]
    fn day_labels() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(day_label(today.pred_opt().unwrap(), today), "Yesterday");
        assert_eq!(
            day_label(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(), today),
            "Wed, 01 May 2024"
        );
    }
}
