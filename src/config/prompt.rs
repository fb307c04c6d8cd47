use log::info;
use serde::Deserialize;
use std::fs;
use std::sync::Arc;

use crate::error::ConfigError;

/// Regulatory assistant persona: formal register, answers only from the knowledge base,
/// Arabic by default and English when the user asks in English.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    r#"
أنت مساعد ذكي متخصص في أنظمة ولوائح البنك المركزي السعودي (ساما).

## التعليمات:
- أجب على الأسئلة باللغة العربية بشكل افتراضي
- إذا سأل المستخدم باللغة الإنجليزية أو طلب الإجابة بالإنجليزية، أجب بالإنجليزية
- استخدم أسلوباً رسمياً ومهنياً يليق بالقطاع المالي والتنظيمي
- عند الإجابة، اذكر اسم النظام أو اللائحة والمادة أو البند المرجعي إن وُجد
- كن دقيقاً ومختصراً وواضحاً في إجاباتك

## قواعد مهمة:
- أجب فقط من المعلومات الموجودة في قاعدة المعرفة
- إذا لم تجد الإجابة في الوثائق المتاحة، قل:
  "عذراً، لم أتمكن من العثور على معلومات حول هذا الاستفسار في الأنظمة واللوائح المتاحة. يُرجى التواصل مع الإدارة المختصة للحصول على مزيد من التوضيح."
- لا تختلق أو تفترض معلومات غير موجودة في المستندات
"#;

pub const DEFAULT_GREETING: &str =
    "مرحباً! أنا مساعدك الذكي للأنظمة واللوائح الصادرة من البنك المركزي السعودي (ساما). كيف يمكنني مساعدتك؟";

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PersonaConfig {
    pub system_instruction: String,
    #[serde(default = "default_greeting")]
    pub greeting: String,
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

pub fn load_persona(path: &str) -> Result<Arc<PersonaConfig>, ConfigError> {
    let file_content = fs::read_to_string(path).map_err(|source| ConfigError::PersonaIo {
        path: path.to_string(),
        source,
    })?;
    let config: PersonaConfig = serde_json
        ::from_str(&file_content)
        .map_err(|source| ConfigError::PersonaJson {
            path: path.to_string(),
            source,
        })?;
    info!("Loaded persona from: {}", path);
    Ok(Arc::new(config))
}

/// Persona from `path` when given, otherwise the built-in regulatory assistant.
pub fn resolve_persona(path: Option<&str>) -> Result<Arc<PersonaConfig>, ConfigError> {
    match path.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => load_persona(p),
        None => Ok(Arc::new(PersonaConfig::default())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_persona_refuses_outside_knowledge_base() {
        let persona = resolve_persona(None).unwrap();
        assert!(persona.system_instruction.contains("أجب فقط من المعلومات الموجودة في قاعدة المعرفة"));
        assert_eq!(persona.greeting, DEFAULT_GREETING);
    }

    #[test]
    fn loads_persona_file_with_default_greeting() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "system_instruction": "Answer in English only." }}"#).unwrap();

        let persona = resolve_persona(file.path().to_str()).unwrap();
        assert_eq!(persona.system_instruction, "Answer in English only.");
        assert_eq!(persona.greeting, DEFAULT_GREETING);
    }

    #[test]
    fn missing_or_invalid_persona_file_is_a_config_error() {
        assert!(matches!(load_persona("/nonexistent/persona.json"), Err(ConfigError::PersonaIo { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(
            matches!(
                load_persona(file.path().to_str().unwrap()),
                Err(ConfigError::PersonaJson { .. })
            )
        );
    }
}
