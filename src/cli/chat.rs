//! 대화형 모드 입력 해석

use std::path::PathBuf;

/// 대화형 모드 한 줄 입력
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// 파일 또는 폴더 추가
    Add(PathBuf),
    /// 텍스트 붙여넣기
    Paste(String),
    /// 데모 문서 추가
    Demo,
    /// 문서 목록
    Docs,
    /// 이름으로 문서 삭제
    Remove(String),
    /// 전체 삭제
    Clear,
    Help,
    Quit,
    /// 질문
    Ask(String),
    /// 빈 줄
    Empty,
    /// 잘못된 명령 (사용법 안내)
    Invalid(String),
}

impl ChatCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ChatCommand::Empty;
        }
        if !line.starts_with('/') {
            return ChatCommand::Ask(line.to_string());
        }

        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (line, ""),
        };

        match (command, rest.is_empty()) {
            ("/add", false) => ChatCommand::Add(PathBuf::from(rest)),
            ("/add", true) => ChatCommand::Invalid("/add <path>".into()),
            ("/paste", false) => ChatCommand::Paste(rest.to_string()),
            ("/paste", true) => ChatCommand::Invalid("/paste <text>".into()),
            ("/remove", false) => ChatCommand::Remove(rest.to_string()),
            ("/remove", true) => ChatCommand::Invalid("/remove <name>".into()),
            ("/demo", _) => ChatCommand::Demo,
            ("/docs", _) => ChatCommand::Docs,
            ("/clear", _) => ChatCommand::Clear,
            ("/help", _) => ChatCommand::Help,
            ("/quit", _) | ("/exit", _) => ChatCommand::Quit,
            (other, _) => ChatCommand::Invalid(format!("알 수 없는 명령: {} (/help)", other)),
        }
    }
}

/// 도움말
pub const HELP: &str = "\
  /add <path>     파일 또는 폴더 추가
  /paste <text>   텍스트 붙여넣기
  /demo           데모 문서 추가
  /docs           문서 목록
  /remove <name>  문서 삭제
  /clear          전체 삭제
  /quit           종료
  그 외 입력은 질문으로 처리됩니다.";
