//! 短信模板渲染
//!
//! 只做 `{identifier}` 占位符替换，不是通用模板引擎：
//! - identifier 为 `[A-Za-z_][A-Za-z0-9_]*`
//! - 上下文中没有的占位符原样保留
//! - 替换进去的值不会再次被扫描

use std::collections::HashMap;

/// 单条短信分段长度
pub const SMS_SEGMENT_LEN: usize = 160;

/// 模板渲染上下文（占位符名 -> 值）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    values: HashMap<String, String>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// 从记录字段构建上下文
    ///
    /// - `customer_name`: prospect_name > customer_name > prospect（商机上只有链接时退回链接名）
    /// - `job_nickname`: probuild_job_nickname
    /// - `opportunity_name`: 记录名
    /// - `company_name`: 配置的公司名
    pub fn from_record(
        name: &str,
        fields: &HashMap<String, String>,
        company_name: &str,
    ) -> Self {
        fn field<'a>(fields: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
            fields
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        }
        let customer_name = field(fields, "prospect_name")
            .or_else(|| field(fields, "customer_name"))
            .or_else(|| field(fields, "prospect"))
            .unwrap_or("");
        RenderContext::new()
            .with("customer_name", customer_name)
            .with(
                "job_nickname",
                field(fields, "probuild_job_nickname").unwrap_or(""),
            )
            .with("opportunity_name", name)
            .with("company_name", company_name)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RenderContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// 渲染模板：把 `{name}` 替换为上下文中的值
pub fn render(body: &str, context: &RenderContext) -> String {
    let mut out = String::with_capacity(body.len());
    let mut rest = body;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        // 读取 identifier，直到遇到 '}'
        let ident_len = after
            .char_indices()
            .take_while(|&(i, c)| {
                if i == 0 {
                    is_ident_start(c)
                } else {
                    is_ident_continue(c)
                }
            })
            .map(|(i, c)| i + c.len_utf8())
            .last()
            .unwrap_or(0);

        let closed = ident_len > 0 && after[ident_len..].starts_with('}');
        if closed {
            let key = &after[..ident_len];
            match context.get(key) {
                Some(value) => out.push_str(value),
                None => {
                    out.push('{');
                    out.push_str(key);
                    out.push('}');
                }
            }
            rest = &after[ident_len + 1..];
        } else {
            // 不是合法占位符，原样输出 '{' 继续扫描
            out.push('{');
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

/// 字数与分段信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentInfo {
    pub characters: usize,
    pub segments: usize,
}

impl SegmentInfo {
    pub fn label(&self) -> String {
        format!(
            "{} characters ({} SMS segment{})",
            self.characters,
            self.segments,
            if self.segments > 1 { "s" } else { "" }
        )
    }
}

/// 计算短信分段（空消息也算 1 段）
pub fn segment_info(body: &str) -> SegmentInfo {
    let characters = body.chars().count();
    let segments = characters.div_ceil(SMS_SEGMENT_LEN).max(1);
    SegmentInfo {
        characters,
        segments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RenderContext {
        [("customer_name", "Alex"), ("job_nickname", "Bayswater")]
            .into_iter()
            .collect()
    }

    #[test]
    fn replaces_known_placeholders() {
        assert_eq!(
            render("Hi {customer_name}, job {job_nickname} ready", &ctx()),
            "Hi Alex, job Bayswater ready"
        );
    }

    #[test]
    fn leaves_unknown_placeholders_verbatim() {
        assert_eq!(
            render("Hi {customer_name}, ref {unknown}", &ctx()),
            "Hi Alex, ref {unknown}"
        );
    }

    #[test]
    fn identity_without_recognised_placeholders() {
        for input in [
            "",
            "plain text",
            "{ spaced }",
            "{1abc} {} {",
            "}{",
            "json {\"a\": 1}",
            "emoji {😀}",
        ] {
            assert_eq!(render(input, &ctx()), input);
        }
    }

    #[test]
    fn replaces_every_occurrence_without_rescanning() {
        let ctx = RenderContext::new()
            .with("a", "{b}")
            .with("b", "B");
        assert_eq!(render("{a}-{a}-{b}", &ctx), "{b}-{b}-B");
    }

    #[test]
    fn context_from_record_fields() {
        let fields: HashMap<String, String> = [
            ("prospect".to_string(), "PROS-0007".to_string()),
            ("probuild_job_nickname".to_string(), "Bayswater".to_string()),
        ]
        .into_iter()
        .collect();
        let ctx = RenderContext::from_record("OPP-0001", &fields, "Probuild");
        assert_eq!(ctx.get("customer_name"), Some("PROS-0007"));
        assert_eq!(ctx.get("job_nickname"), Some("Bayswater"));
        assert_eq!(ctx.get("opportunity_name"), Some("OPP-0001"));
        assert_eq!(ctx.get("company_name"), Some("Probuild"));
    }

    #[test]
    fn segments_round_up() {
        assert_eq!(segment_info("").segments, 1);
        assert_eq!(segment_info(&"a".repeat(160)).segments, 1);
        assert_eq!(segment_info(&"a".repeat(161)).segments, 2);
        assert_eq!(segment_info("hey").label(), "3 characters (1 SMS segment)");
        assert_eq!(
            segment_info(&"a".repeat(200)).label(),
            "200 characters (2 SMS segments)"
        );
    }
}
