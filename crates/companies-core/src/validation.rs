use crate::{
    error::ServiceError,
    models::{CompanyFields, CompanyInput, MAX_DESCRIPTION_LEN, MAX_NAME_LEN},
};

/// Checks a create payload and returns the columns to persist.
///
/// Lengths are counted in characters, not bytes.
pub fn validate_new_company(input: CompanyInput) -> Result<CompanyFields, ServiceError> {
    let name = input
        .name
        .ok_or_else(|| ServiceError::Validation("name is required".to_string()))?;
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ServiceError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }

    if let Some(description) = &input.description {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ServiceError::Validation(format!(
                "description must be at most {MAX_DESCRIPTION_LEN} characters"
            )));
        }
    }

    let employees_count = input
        .employees_count
        .ok_or_else(|| ServiceError::Validation("employeesCount is required".to_string()))?;
    if employees_count < 0 {
        return Err(ServiceError::Validation(
            "employeesCount must be non-negative".to_string(),
        ));
    }

    let is_registered = input
        .is_registered
        .ok_or_else(|| ServiceError::Validation("isRegistered is required".to_string()))?;
    let company_type = input
        .company_type
        .ok_or_else(|| ServiceError::Validation("type is required".to_string()))?;

    Ok(CompanyFields {
        name,
        description: input.description,
        employees_count,
        is_registered,
        company_type,
    })
}
