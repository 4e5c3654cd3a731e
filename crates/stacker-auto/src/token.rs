//! 脚本词法
//!
//! 一行一条语句：`KEYWORD [param ...]`。分隔符为空格、逗号和 `()[]`；
//! 首个非空白字符为 `#` 的行是注释。
//!
//! 关键字按声明顺序做**前缀匹配**（区分大小写），第一个匹配者胜出。
//! 因此 `STACKUPX` 会被识别为 `STACKUP`；若某个关键字是排在它之后的另一个
//! 关键字的前缀，后者将永远无法被识别，表中不允许出现这种情况。

use crate::error::AutoError;
use smallvec::SmallVec;
use std::fmt;
use tracing::warn;

/// 注释标记
pub const COMMENT_MARKER: char = '#';

/// 分隔符（制表符与回车一并视为空白）
pub const DELIMITERS: &[char] = &[' ', ',', '[', ']', '(', ')', '\t', '\r'];

/// 切分一行
pub fn tokenize(line: &str) -> impl Iterator<Item = &str> {
    line.split(DELIMITERS).filter(|t| !t.is_empty())
}

/// 空行、纯空白行或注释行
///
/// 注释标记之前只允许空白。
pub fn is_blank_or_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.is_empty() || trimmed.starts_with(COMMENT_MARKER)
}

/// 参数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Float,
    Int,
}

/// 参数声明
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
}

const fn float(name: &'static str) -> Param {
    Param {
        name,
        kind: ParamKind::Float,
    }
}

const fn int(name: &'static str) -> Param {
    Param {
        name,
        kind: ParamKind::Int,
    }
}

macro_rules! keywords {
    ($(
        $(#[$doc:meta])*
        $variant:ident => $text:literal, [$($param:expr),*], $waits:literal;
    )*) => {
        /// 脚本关键字
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($(#[$doc])* $variant,)*
        }

        /// 关键字表（匹配顺序）
        pub const KEYWORDS: &[Keyword] = &[$(Keyword::$variant,)*];

        impl Keyword {
            /// 脚本中的拼写
            pub const fn text(self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text,)*
                }
            }

            /// 必需的位置参数
            pub const fn params(self) -> &'static [Param] {
                match self {
                    $(Keyword::$variant => {
                        const PARAMS: &[Param] = &[$($param),*];
                        PARAMS
                    },)*
                }
            }

            /// 是否阻塞等待子系统应答
            pub const fn waits_for_response(self) -> bool {
                match self {
                    $(Keyword::$variant => $waits,)*
                }
            }
        }
    };
}

keywords! {
    /// 模式块编号标记（不执行任何操作）
    Mode => "MODE", [], false;
    /// 逐条语句日志开关
    Debug => "DEBUG", [int("on")], false;
    /// 打印诊断信息
    Message => "MESSAGE", [], false;
    /// 模式块开始
    Begin => "BEGIN", [], false;
    /// 脚本结束
    End => "END", [], false;
    Delay => "DELAY", [float("seconds")], false;
    /// 直接设置左右输出
    Move => "MOVE", [float("left"), float("right")], false;
    /// 按距离直行（换算为时长）
    MeasuredMove => "MMOVE", [float("speed"), float("inches"), float("timeout")], true;
    Turn => "TURN", [float("degrees"), float("timeout")], true;
    Straight => "STRAIGHT", [float("speed"), float("duration")], true;
    ClawOpen => "CLAWOPEN", [], false;
    ClawClose => "CLAWCLOSE", [], false;
    ClawToTop => "CLAWTOTOP", [], true;
    ClawToBottom => "CLAWTOBOTTOM", [], true;
    RaiseCanLoMid => "RAISECANTOLOMID", [], false;
    LowerCanHiMid => "LOWERCANTOHIMID", [], false;
    StackUp => "STACKUP", [int("totes")], true;
    StackDown => "STACKDOWN", [], false;
    StartStackUp => "STARTSTACKUP", [int("totes")], false;
    CanLiftStop => "CANLIFTSTOP", [], false;
    FrontLoadTote => "FRONTLOADTOTE", [float("timeout")], true;
    BackLoadTote => "BACKLOADTOTE", [float("timeout")], true;
    FrontSeekTote => "FRONTSEEKTOTE", [float("speed"), float("timeout")], true;
    BackSeekTote => "BACKSEEKTOTE", [float("speed"), float("timeout")], true;
    StartDriveFwd => "STARTDRIVEFWD", [float("speed")], false;
    StartDriveBck => "STARTDRIVEBCK", [float("speed")], false;
    StopDrive => "STOPDRIVE", [], false;
    WaitFrontBeam => "WAITFRONTBEAM", [], true;
    WaitBackBeam => "WAITBACKBEAM", [], true;
    DepositTotesBack => "DEPOSITTOTESBACK", [], true;
    ToteShiftFwd => "TOTESHIFTFWD", [], false;
    ToteShiftBck => "TOTESHIFTBCK", [], false;
    TotePushBck => "TOTEPUSHBCK", [], false;
    CanArmOpen => "CANARMOPEN", [float("seconds")], false;
    CanArmClose => "CANARMCLOSE", [float("seconds")], false;
    SeekTote => "SEEKTOTE", [float("time_in"), float("timeout")], true;
    /// 已退役（无对应机构）
    StartToteUp => "STARTTOTEUP", [], false;
    /// 已退役（无对应机构）
    ToteExtend => "TOTEEXTEND", [], false;
    /// 已退役（无对应机构）
    ToteRetract => "TOTERETRACT", [], false;
    /// 1 开启 / 0 关闭拨片自动循环
    CubeAuto => "CUBEAUTO", [int("on")], false;
    ClickerUp => "CLICKERUP", [], false;
    ClickerDown => "CLICKERDOWN", [], false;
}

impl Keyword {
    /// 前缀匹配，按表顺序第一个匹配者胜出
    ///
    /// # 示例
    ///
    /// ```rust
    /// use stacker_auto::Keyword;
    ///
    /// assert_eq!(Keyword::lookup("TURN"), Some(Keyword::Turn));
    /// assert_eq!(Keyword::lookup("TURNLEFT"), Some(Keyword::Turn));
    /// assert_eq!(Keyword::lookup("turn"), None);
    /// ```
    pub fn lookup(token: &str) -> Option<Keyword> {
        KEYWORDS
            .iter()
            .copied()
            .find(|k| token.starts_with(k.text()))
    }

    /// 退役关键字：保留识别，执行时只记录日志
    pub fn is_retired(self) -> bool {
        matches!(
            self,
            Keyword::StartToteUp | Keyword::ToteExtend | Keyword::ToteRetract
        )
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// 一条已解析的语句
#[derive(Debug, Clone, PartialEq)]
pub struct Statement<'a> {
    pub keyword: Keyword,
    /// 原始语句（去掉首部分隔符与尾部空白）
    pub text: &'a str,
    /// 关键字之后的剩余文本（`MESSAGE`、`BEGIN` 使用）
    pub rest: &'a str,
    /// 按声明顺序的数值参数
    pub params: SmallVec<[f64; 3]>,
    /// 无法解析、已按 0 处理的参数原文
    pub bad_params: SmallVec<[&'a str; 2]>,
}

impl<'a> Statement<'a> {
    /// 解析一行
    ///
    /// 空行与注释行返回 `Ok(None)`。
    ///
    /// # 错误
    ///
    /// - [`AutoError::UnknownToken`]: 首个记号不匹配任何关键字
    /// - [`AutoError::MissingParameter`]: 参数个数不足
    pub fn parse(line: &'a str) -> Result<Option<Self>, AutoError> {
        if is_blank_or_comment(line) {
            return Ok(None);
        }
        let text = line.trim_start_matches(DELIMITERS).trim_end();
        // 只有分隔符的行
        if text.is_empty() {
            return Ok(None);
        }
        let token = tokenize(text).next().unwrap_or(text);
        let keyword = Keyword::lookup(token).ok_or_else(|| AutoError::UnknownToken {
            token: token.to_string(),
            statement: text.to_string(),
        })?;

        let rest = text[token.len()..].trim_start_matches(DELIMITERS);
        let mut values = tokenize(rest);
        let mut params = SmallVec::new();
        let mut bad_params = SmallVec::new();

        for param in keyword.params() {
            let raw = values.next().ok_or_else(|| AutoError::MissingParameter {
                keyword: keyword.text(),
                name: param.name,
                statement: text.to_string(),
            })?;
            let value = match param.kind {
                ParamKind::Float => raw.parse::<f64>().ok().filter(|v| v.is_finite()),
                ParamKind::Int => raw
                    .parse::<i64>()
                    .map(|v| v as f64)
                    .or_else(|_| raw.parse::<f64>().map(f64::trunc))
                    .ok()
                    .filter(|v| v.is_finite()),
            };
            let value = value.unwrap_or_else(|| {
                warn!("{}: bad numeric parameter '{}', using 0", keyword, raw);
                bad_params.push(raw);
                0.0
            });
            params.push(value);
        }

        Ok(Some(Statement {
            keyword,
            text,
            rest,
            params,
            bad_params,
        }))
    }

    /// 第 `index` 个参数
    pub fn param(&self, index: usize) -> f64 {
        self.params.get(index).copied().unwrap_or(0.0)
    }

    /// 第 `index` 个参数（整数）
    pub fn int_param(&self, index: usize) -> i32 {
        self.param(index) as i32
    }
}
