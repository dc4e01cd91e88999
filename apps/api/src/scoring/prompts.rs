/// System prompt for relevance scoring.
pub const SCORING_SYSTEM: &str = "You are an expert career counselor analyzing how well a \
    candidate matches a job posting. You respond with valid JSON only.";

/// Scoring prompt. Placeholders: {title}, {company}, {location}, {description},
/// {resume}, {threshold}.
pub const SCORING_PROMPT_TEMPLATE: &str = r#"Score how well this candidate fits the job.

Job Title: {title}
Company: {company}
Location: {location}
Description:
{description}

Candidate Resume:
{resume}

Score the match from 0-100 using these weights:
- Technical skills match (43%): how well the candidate's technical skills align with the requirements
- Experience level (35%): appropriate years and type of experience
- Domain relevance (15%): background in a relevant industry or domain
- Location fit (2%): relocation needs and remote compatibility
- Additional qualifications (5%): certifications, education, soft skills

Return ONLY this JSON object:
{
  "score": <integer 0-100>,
  "reasoning": "<2-3 sentences explaining the score>",
  "key_matches": ["<matching skill>", "..."],
  "missing_skills": ["<missing skill>", "..."],
  "recommendation": "<APPLY if score >= {threshold}, otherwise SKIP>"
}"#;
