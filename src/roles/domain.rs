//! Dominio de roles y control de acceso.
//!
//! El nivel de acceso se resuelve desde el almacén de documentos y gatea qué
//! comandos están disponibles. Todo chequeo de permiso pasa por un único
//! predicado (`Rol::permite`) en vez de condicionales dispersos.


use serde::{Deserialize, Serialize};


/// Nivel de acceso del principal. `Desconocido` cubre la sesión sin
/// resolver y los valores basura del almacén.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Rol {
    Invitado,
    Admin,
    Superadmin,
    #[default]
    Desconocido,
}

/// Operaciones gateadas por rol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacidad {
    ControlarBomba,
    EditarSetpoints,
    VerHistorial,
    AdministrarUsuarios,
}

impl Rol {
    /// Parseo tolerante del texto almacenado (espacios y mayúsculas varían
    /// entre escrituras históricas).
    pub fn desde_texto(valor: &str) -> Rol {
        match valor.trim().to_uppercase().as_str() {
            "INVITADO" => Rol::Invitado,
            "ADMIN" => Rol::Admin,
            "SUPERADMIN" => Rol::Superadmin,
            _ => Rol::Desconocido,
        }
    }

    /// Forma canónica con la que se persiste y se firma el historial.
    pub fn como_texto(&self) -> &'static str {
        match self {
            Rol::Invitado => "invitado",
            Rol::Admin => "admin",
            Rol::Superadmin => "superadmin",
            Rol::Desconocido => "desconocido",
        }
    }

    /// Chequeo central de capacidades. El invitado es sólo-lectura.
    pub fn permite(&self, capacidad: Capacidad) -> bool {
        match capacidad {
            Capacidad::VerHistorial => {
                matches!(self, Rol::Invitado | Rol::Admin | Rol::Superadmin)
            }
            Capacidad::ControlarBomba | Capacidad::EditarSetpoints => {
                matches!(self, Rol::Admin | Rol::Superadmin)
            }
            Capacidad::AdministrarUsuarios => matches!(self, Rol::Superadmin),
        }
    }
}


/// Documento de usuario del almacén de documentos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UsuarioData {
    pub uid: String,
    pub correo: String,
    pub nombre: String,
    pub rol: String,
}

impl UsuarioData {
    pub fn rol_enum(&self) -> Rol {
        Rol::desde_texto(&self.rol)
    }
}


/// Identidad viva del principal durante la sesión del servicio.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sesion {
    pub uid: String,
    pub correo: String,
    pub rol: Rol,
}


/// Regla de bootstrap: el primer usuario del sistema queda superadmin,
/// todos los siguientes entran como invitados.
pub fn rol_inicial(hay_usuarios: bool) -> Rol {
    if hay_usuarios {
        Rol::Invitado
    } else {
        Rol::Superadmin
    }
}


/// Comandos de administración de usuarios (sólo superadmin).
#[derive(Debug, Clone, PartialEq)]
pub enum ComandoUsuarios {
    CambiarRol { uid: String, nuevo_rol: Rol },
    EliminarUsuario { uid: String },
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parseo_tolerante_de_roles() {
        assert_eq!(Rol::desde_texto("superadmin"), Rol::Superadmin);
        assert_eq!(Rol::desde_texto("  Admin "), Rol::Admin);
        assert_eq!(Rol::desde_texto("INVITADO"), Rol::Invitado);
        assert_eq!(Rol::desde_texto("operario"), Rol::Desconocido);
        assert_eq!(Rol::desde_texto(""), Rol::Desconocido);
    }

    #[test]
    fn matriz_de_capacidades() {
        assert!(!Rol::Invitado.permite(Capacidad::ControlarBomba));
        assert!(Rol::Invitado.permite(Capacidad::VerHistorial));

        assert!(Rol::Admin.permite(Capacidad::ControlarBomba));
        assert!(Rol::Admin.permite(Capacidad::EditarSetpoints));
        assert!(!Rol::Admin.permite(Capacidad::AdministrarUsuarios));

        assert!(Rol::Superadmin.permite(Capacidad::AdministrarUsuarios));

        assert!(!Rol::Desconocido.permite(Capacidad::VerHistorial));
        assert!(!Rol::Desconocido.permite(Capacidad::ControlarBomba));
    }

    #[test]
    fn primer_usuario_queda_superadmin() {
        assert_eq!(rol_inicial(false), Rol::Superadmin);
        assert_eq!(rol_inicial(true), Rol::Invitado);
    }
}
