//! Chooses the system prompt for an incoming message.
//!
//! Health-related requests get the specialized healer prompt; everything
//! else falls back to the general assistant prompt. Matching is plain
//! lowercase substring search over Russian keywords.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Healer,
    General,
}

const HEALER_KEYWORDS: &[&str] = &[
    "здоровье", "симптом", "симптомы", "болит", "больно", "болезнь", "недомогание", "недуг",
    "лечение", "лечить", "вылечить", "избавиться от", "помоги с", "проблема с",
    "диагноз", "диагностика", "анализы", "обследование", "врач", "доктор", "медик", "медицина",
    "клиника", "больница", "специалист", "рецепт", "таблетки", "лекарство",
    "психосоматика", "гнм", "германская новая медицина", "хамер", "dhs", "сбп",
    "биологический конфликт", "эмоциональная причина", "психолог", "психотерапевт", "психиатр",
    "душа", "эмоции", "чувства", "переживания",
    "аллергия", "астма", "давление", "мигрень", "бессонница", "депрессия", "апатия",
    "тревога", "стресс", "паническая атака", "страх", "фобия",
    "голова", "сердце", "желудок", "кишечник", "печень", "почки", "легкие", "бронхи",
    "кожа", "сыпь", "зуд", "экзема", "псориаз",
    "спина", "поясница", "шея", "сустав", "мышцы", "кость",
    "ухо", "глаз", "нос", "горло", "зубы",
    "свист", "шум", "звон", "онемение", "покалывание", "головокружение", "тошнота", "рвота",
    "слабость", "усталость", "температура", "жар", "озноб", "кашель", "насморк",
    "отек", "опухоль", "воспаление", "инфекция", "вирус", "бактерия",
    "что со мной", "почему я так себя чувствую", "что это может быть", "из-за чего это",
    "как мне быть", "что делать если",
];

const PERSONAL_INDICATORS: &[&str] = &[
    "у меня", "меня беспокоит", "я чувствую", "мои ", "мой ", "моя ", "мне ", "со мной",
    "я страдаю", "я болею",
];

pub fn classify(prompt: &str) -> PromptKind {
    let lower = prompt.to_lowercase();

    if HEALER_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        return PromptKind::Healer;
    }

    let personal = PERSONAL_INDICATORS.iter().any(|ind| lower.contains(ind));
    if personal
        && (lower.contains("проблем")
            || lower.contains("вопрос о здоровь")
            || lower.contains("самочувстви"))
    {
        return PromptKind::Healer;
    }

    if lower.contains("помоги")
        && (lower.contains("здоровь") || lower.contains("симптом") || lower.contains("недуг"))
    {
        return PromptKind::Healer;
    }

    PromptKind::General
}
