// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 路径片段匹配器
//!
//! 对路径中的每一个片段（文件名或目录名）做 glob 匹配，用于 `exclude`
//! 规则和自定义响应头规则的 `include` 过滤。
//!
//! - 模式以 `!` 开头表示否定；
//! - `*` 匹配除 `/` 以外的任意字符（可以为空）；
//! - 含有 `/` 或 `\` 的模式会被直接丢弃，因为匹配器只作用于单个片段。

use regex::Regex;

/// 单个片段模式：不含 `*` 时使用字符串相等比较，否则编译为锚定的正则。
#[derive(Debug, Clone)]
enum SegmentPattern {
    Literal(String),
    Glob(Regex),
}

impl SegmentPattern {
    fn parse(pattern: &str) -> Option<Self> {
        if !pattern.contains('*') {
            return Some(SegmentPattern::Literal(pattern.to_string()));
        }
        let source = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("[^/]*");
        Regex::new(&format!("^{}$", source))
            .ok()
            .map(SegmentPattern::Glob)
    }

    fn matches(&self, segment: &str) -> bool {
        match self {
            SegmentPattern::Literal(value) => value == segment,
            SegmentPattern::Glob(re) => re.is_match(segment),
        }
    }
}

/// 由有序的模式列表构造的片段匹配器。
#[derive(Debug, Clone)]
pub struct PathMatcher {
    positive: Vec<SegmentPattern>,
    negative: Vec<SegmentPattern>,
    case_sensitive: bool,
}

impl PathMatcher {
    pub fn new<S: AsRef<str>>(patterns: &[S], case_sensitive: bool) -> Self {
        let mut positive = vec![];
        let mut negative = vec![];
        for raw in patterns {
            let mut pattern = raw.as_ref().trim();
            let is_negative = pattern.starts_with('!');
            if is_negative {
                pattern = pattern[1..].trim();
            }
            if pattern.is_empty() || pattern.contains('/') || pattern.contains('\\') {
                continue;
            }
            let pattern = if case_sensitive {
                pattern.to_string()
            } else {
                pattern.to_lowercase()
            };
            if let Some(parsed) = SegmentPattern::parse(&pattern) {
                if is_negative {
                    negative.push(parsed);
                } else {
                    positive.push(parsed);
                }
            }
        }
        Self {
            positive,
            negative,
            case_sensitive,
        }
    }

    /// 片段命中条件：至少一个正向模式匹配，且没有任何否定模式匹配。
    pub fn test_segment(&self, segment: &str) -> bool {
        let lowered;
        let segment = if self.case_sensitive {
            segment
        } else {
            lowered = segment.to_lowercase();
            &lowered
        };
        self.positive.iter().any(|p| p.matches(segment))
            && !self.negative.iter().any(|p| p.matches(segment))
    }

    /// 路径中只要有一个片段命中，整个路径即视为命中。
    pub fn test(&self, path: &str) -> bool {
        path.split(['/', '\\'])
            .filter(|s| !s.is_empty())
            .any(|segment| self.test_segment(segment))
    }
}
