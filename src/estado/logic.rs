//! Lógica del Agregador de Estado.
//!
//! Una única tarea posee las lecturas y la instantánea publicada: todos los
//! callbacks de suscripción y todos los comandos quedan serializados sobre
//! su `select!`, así que no hace falta exclusión mutua. Cada novedad de
//! cualquier feed dispara una recombinación completa.
//!
//! Los comandos son un único viaje al almacén remoto y no se paralelizan
//! entre sí. Un comando exitoso agrega exactamente un evento de auditoría;
//! una falla sólo queda en `error` (sin historial, sin reintento, sin UI
//! optimista: la instantánea cambia recién cuando llega el eco remoto).


use serde_json::json;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};
use crate::estado::domain::{combinar, validar_setpoints, Actualizacion, Comando, EstadoPlanta, Lecturas};
use crate::gateway::domain::{rutas, Almacen, ControlGateway};
use crate::historial::domain::AccionHistorial;
use crate::roles::domain::{Capacidad, Sesion};


fn publicar(tx: &watch::Sender<EstadoPlanta>,
            lecturas: &Lecturas,
            hay_internet: bool,
            conectado: bool,
            error: &Option<String>) {

    let mut estado = combinar(lecturas, hay_internet, conectado);
    if error.is_some() {
        estado.cargando = false;
        estado.error = error.clone();
    }
    let _ = tx.send(estado);
}


fn etiqueta_bomba(encendida: bool) -> &'static str {
    if encendida { "encendida" } else { "apagada" }
}


async fn registrar(tx_historial: &mpsc::Sender<AccionHistorial>,
                   tipo: &str,
                   nombre: String,
                   estado: bool) {

    let accion = AccionHistorial::Registrar {
        tipo: tipo.to_string(),
        nombre,
        estado,
        correo_manual: None,
        rol_manual: None,
    };
    if tx_historial.send(accion).await.is_err() {
        error!("Error: no se pudo enviar el evento al historial");
    }
}


/// Ejecuta un comando contra el almacén remoto.
///
/// El orden de los chequeos importa: el modo automático convierte al toggle
/// en un no-op silencioso (sin escritura ni historial) antes de evaluar
/// permisos; la validación de setpoints rechaza antes de cualquier escritura.
pub async fn ejecutar_comando<A: Almacen>(comando: Comando,
                                          almacen: &A,
                                          sesion: &Sesion,
                                          lecturas: &Lecturas,
                                          tx_gateway: &mpsc::Sender<ControlGateway>,
                                          tx_historial: &mpsc::Sender<AccionHistorial>)
                                          -> Result<(), crate::system::domain::AppError> {

    use crate::system::domain::AppError;

    match comando {
        Comando::ToggleBomba => {
            if lecturas.modo_auto == Some(true) {
                debug!("Debug: modo automático activo, toggle ignorado");
                return Ok(());
            }
            if !sesion.rol.permite(Capacidad::ControlarBomba) {
                return Err(AppError::Permiso("el rol actual no controla la bomba".to_string()));
            }

            let actual = almacen.leer_bool(rutas::BOMBA).await?;
            let nuevo = !actual;
            almacen.escribir(rutas::BOMBA, json!(nuevo)).await?;
            // La luz acompaña siempre a la bomba.
            almacen.escribir(rutas::LUZ, json!(nuevo)).await?;

            let texto = format!("Bomba: {} → {}", etiqueta_bomba(actual), etiqueta_bomba(nuevo));
            registrar(tx_historial, "Bomba", texto, nuevo).await;
            Ok(())
        }

        Comando::GuardarSetpoints { min, max } => {
            if !sesion.rol.permite(Capacidad::EditarSetpoints) {
                return Err(AppError::Permiso("el rol actual no edita setpoints".to_string()));
            }
            let (min, max) = validar_setpoints(min, max)?;

            almacen.escribir_multi(vec![
                (rutas::SET_MIN.to_string(), json!(min)),
                (rutas::SET_MAX.to_string(), json!(max)),
            ]).await?;

            let texto = format!("setpoint_ultrasonico_min={min:?}, setpoint_ultrasonico_max={max:?}");
            registrar(tx_historial, "Setpoint", texto, true).await;
            Ok(())
        }

        Comando::SetModoAutomatico(automatico) => {
            if !sesion.rol.permite(Capacidad::ControlarBomba) {
                return Err(AppError::Permiso("el rol actual no cambia el modo".to_string()));
            }
            almacen.escribir(rutas::MODE_AUTO, json!(automatico)).await?;

            let texto = format!("Modo automático: {}",
                                if automatico { "activado" } else { "desactivado" });
            registrar(tx_historial, "Bomba", texto, automatico).await;
            Ok(())
        }

        Comando::Reconectar => {
            if tx_gateway.send(ControlGateway::Reconectar).await.is_err() {
                error!("Error: no se pudo pedir la reconexión al gateway");
            }
            Ok(())
        }
    }
}


/// Bucle principal del agregador.
///
/// Combina las suscripciones remotas y las señales de conectividad en la
/// instantánea publicada por `watch`, y atiende los comandos imperativos
/// del frontend. Vive lo que vive la sesión del servicio; al cerrarse los
/// canales la tarea termina y las suscripciones caen con ella.
pub async fn run_estado<A: Almacen>(mut rx_actualizaciones: mpsc::Receiver<Actualizacion>,
                                    mut rx_comandos: mpsc::Receiver<Comando>,
                                    tx_estado: watch::Sender<EstadoPlanta>,
                                    tx_gateway: mpsc::Sender<ControlGateway>,
                                    tx_historial: mpsc::Sender<AccionHistorial>,
                                    rx_sesion: watch::Receiver<Sesion>,
                                    almacen: A) {

    info!("Info: estado task creada");

    let mut lecturas = Lecturas::default();
    let mut hay_internet = true;
    let mut conectado = true;
    let mut error: Option<String> = None;

    loop {
        tokio::select! {
            actualizacion = rx_actualizaciones.recv() => {
                match actualizacion {
                    Some(Actualizacion::Cambio(cambio)) => {
                        lecturas.aplicar(&cambio);
                        error = None;
                    }
                    Some(Actualizacion::Conexion(valor)) => conectado = valor,
                    Some(Actualizacion::Internet(valor)) => hay_internet = valor,
                    Some(Actualizacion::Fallo(mensaje)) => error = Some(mensaje),
                    None => break,
                }
                publicar(&tx_estado, &lecturas, hay_internet, conectado, &error);
            }

            comando = rx_comandos.recv() => {
                let Some(comando) = comando else { break };
                let sesion = rx_sesion.borrow().clone();
                if let Err(e) = ejecutar_comando(comando, &almacen, &sesion, &lecturas,
                                                 &tx_gateway, &tx_historial).await {
                    error = Some(e.to_string());
                    publicar(&tx_estado, &lecturas, hay_internet, conectado, &error);
                }
            }
        }
    }

    info!("Info: estado task finalizada");
}


pub fn start_estado<A: Almacen + 'static>(rx_from_gateway: mpsc::Receiver<Actualizacion>,
                                          rx_comandos: mpsc::Receiver<Comando>,
                                          tx_estado: watch::Sender<EstadoPlanta>,
                                          tx_to_gateway: mpsc::Sender<ControlGateway>,
                                          tx_to_historial: mpsc::Sender<AccionHistorial>,
                                          rx_sesion: watch::Receiver<Sesion>,
                                          almacen: A) {

    info!("Info: iniciando tarea estado");
    tokio::spawn(async move {
        run_estado(rx_from_gateway,
                   rx_comandos,
                   tx_estado,
                   tx_to_gateway,
                   tx_to_historial,
                   rx_sesion,
                   almacen).await;
    });
}


/// Observador de la instantánea publicada, para trazabilidad.
pub async fn run_monitor(mut rx_estado: watch::Receiver<EstadoPlanta>) {
    while rx_estado.changed().await.is_ok() {
        let estado = rx_estado.borrow_and_update().clone();
        debug!(
            cargando = estado.cargando,
            conectado = estado.conectado,
            hay_internet = estado.hay_internet,
            nivel = ?estado.nivel_actual,
            error = ?estado.error,
            "estado recombinado"
        );
    }
}


pub fn start_monitor(rx_estado: watch::Receiver<EstadoPlanta>) {
    tokio::spawn(async move {
        run_monitor(rx_estado).await;
    });
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc::error::TryRecvError;
    use crate::estado::domain::EstadoActuador;
    use crate::gateway::domain::{CambioRemoto, Valor};
    use crate::roles::domain::Rol;
    use crate::system::domain::AppError;

    /// Almacén en memoria que registra cada escritura recibida.
    #[derive(Clone, Default)]
    struct AlmacenPrueba {
        bomba: Arc<Mutex<bool>>,
        escrituras: Arc<Mutex<Vec<(String, serde_json::Value)>>>,
    }

    impl Almacen for AlmacenPrueba {
        async fn leer_bool(&self, _ruta: &str) -> Result<bool, AppError> {
            Ok(*self.bomba.lock().unwrap())
        }

        async fn escribir(&self, ruta: &str, valor: serde_json::Value) -> Result<(), AppError> {
            self.escrituras.lock().unwrap().push((ruta.to_string(), valor));
            Ok(())
        }

        async fn escribir_multi(&self, pares: Vec<(String, serde_json::Value)>) -> Result<(), AppError> {
            self.escrituras.lock().unwrap().extend(pares);
            Ok(())
        }
    }

    struct Banco {
        almacen: AlmacenPrueba,
        sesion: Sesion,
        tx_gateway: mpsc::Sender<ControlGateway>,
        rx_gateway: mpsc::Receiver<ControlGateway>,
        tx_historial: mpsc::Sender<AccionHistorial>,
        rx_historial: mpsc::Receiver<AccionHistorial>,
    }

    fn banco(rol: Rol) -> Banco {
        let (tx_gateway, rx_gateway) = mpsc::channel(10);
        let (tx_historial, rx_historial) = mpsc::channel(10);
        Banco {
            almacen: AlmacenPrueba::default(),
            sesion: Sesion {
                uid: "u1".to_string(),
                correo: "ana@planta.com".to_string(),
                rol,
            },
            tx_gateway,
            rx_gateway,
            tx_historial,
            rx_historial,
        }
    }

    #[tokio::test]
    async fn toggle_es_noop_en_modo_automatico() {
        let mut b = banco(Rol::Superadmin);
        let mut lecturas = Lecturas::default();
        lecturas.modo_auto = Some(true);

        let resultado = ejecutar_comando(Comando::ToggleBomba, &b.almacen, &b.sesion,
                                         &lecturas, &b.tx_gateway, &b.tx_historial).await;

        assert!(resultado.is_ok());
        assert!(b.almacen.escrituras.lock().unwrap().is_empty());
        assert!(matches!(b.rx_historial.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn toggle_niega_la_bomba_y_arrastra_la_luz() {
        let mut b = banco(Rol::Admin);
        *b.almacen.bomba.lock().unwrap() = true;
        let mut lecturas = Lecturas::default();
        lecturas.modo_auto = Some(false);

        ejecutar_comando(Comando::ToggleBomba, &b.almacen, &b.sesion,
                         &lecturas, &b.tx_gateway, &b.tx_historial).await.unwrap();

        let escrituras = b.almacen.escrituras.lock().unwrap().clone();
        assert_eq!(escrituras, vec![
            (rutas::BOMBA.to_string(), json!(false)),
            (rutas::LUZ.to_string(), json!(false)),
        ]);

        match b.rx_historial.try_recv().unwrap() {
            AccionHistorial::Registrar { tipo, nombre, estado, .. } => {
                assert_eq!(tipo, "Bomba");
                assert_eq!(nombre, "Bomba: encendida → apagada");
                assert!(!estado);
            }
            otro => panic!("acción inesperada: {otro:?}"),
        }
    }

    #[tokio::test]
    async fn invitado_no_escribe_ni_registra() {
        let mut b = banco(Rol::Invitado);
        let mut lecturas = Lecturas::default();
        lecturas.modo_auto = Some(false);

        let resultado = ejecutar_comando(Comando::ToggleBomba, &b.almacen, &b.sesion,
                                         &lecturas, &b.tx_gateway, &b.tx_historial).await;

        assert!(matches!(resultado, Err(AppError::Permiso(_))));
        assert!(b.almacen.escrituras.lock().unwrap().is_empty());
        assert!(matches!(b.rx_historial.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn setpoints_invertidos_no_escriben_ni_registran() {
        let mut b = banco(Rol::Admin);

        let resultado = ejecutar_comando(Comando::GuardarSetpoints { min: 50.0, max: 30.0 },
                                         &b.almacen, &b.sesion, &Lecturas::default(),
                                         &b.tx_gateway, &b.tx_historial).await;

        assert!(matches!(resultado, Err(AppError::Validacion(_))));
        assert!(b.almacen.escrituras.lock().unwrap().is_empty());
        assert!(matches!(b.rx_historial.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn setpoints_validos_van_en_una_sola_escritura() {
        let mut b = banco(Rol::Admin);

        ejecutar_comando(Comando::GuardarSetpoints { min: 10.006, max: 50.0 },
                         &b.almacen, &b.sesion, &Lecturas::default(),
                         &b.tx_gateway, &b.tx_historial).await.unwrap();

        let escrituras = b.almacen.escrituras.lock().unwrap().clone();
        assert_eq!(escrituras, vec![
            (rutas::SET_MIN.to_string(), json!(10.01)),
            (rutas::SET_MAX.to_string(), json!(50.0)),
        ]);

        match b.rx_historial.try_recv().unwrap() {
            AccionHistorial::Registrar { tipo, nombre, .. } => {
                assert_eq!(tipo, "Setpoint");
                assert!(nombre.contains("ultrasonico"));
            }
            otro => panic!("acción inesperada: {otro:?}"),
        }
    }

    #[tokio::test]
    async fn reconectar_llega_al_gateway() {
        let mut b = banco(Rol::Invitado);

        ejecutar_comando(Comando::Reconectar, &b.almacen, &b.sesion, &Lecturas::default(),
                         &b.tx_gateway, &b.tx_historial).await.unwrap();

        assert_eq!(b.rx_gateway.try_recv().unwrap(), ControlGateway::Reconectar);
    }

    #[tokio::test]
    async fn el_actor_combina_los_feeds_en_la_instantanea() {
        let (tx_act, rx_act) = mpsc::channel(32);
        let (_tx_cmd, rx_cmd) = mpsc::channel(8);
        let (tx_gw, _rx_gw) = mpsc::channel(8);
        let (tx_hist, _rx_hist) = mpsc::channel(8);
        let (tx_estado, mut rx_estado) = watch::channel(EstadoPlanta::default());
        let (_tx_sesion, rx_sesion) = watch::channel(Sesion::default());

        tokio::spawn(run_estado(rx_act, rx_cmd, tx_estado, tx_gw, tx_hist,
                                rx_sesion, AlmacenPrueba::default()));

        let feeds = [
            (rutas::BOMBA, Valor::Bool(true)),
            (rutas::LUZ, Valor::Bool(true)),
            (rutas::ULTRASONICO, Valor::Numero(55.0)),
            (rutas::SET_MIN, Valor::Numero(30.0)),
            (rutas::SET_MAX, Valor::Numero(80.0)),
            (rutas::MODE_AUTO, Valor::Bool(false)),
            (rutas::ALERTA_SOBRENIVEL, Valor::Bool(false)),
        ];
        for (ruta, valor) in feeds {
            tx_act.send(Actualizacion::Cambio(CambioRemoto {
                ruta: ruta.to_string(),
                valor: Some(valor),
            })).await.unwrap();
        }

        // Espera hasta que la instantánea refleje el último feed.
        loop {
            rx_estado.changed().await.unwrap();
            let estado = rx_estado.borrow_and_update().clone();
            if estado.set_max == Some(80.0) {
                assert!(!estado.cargando);
                assert_eq!(estado.error, None);
                assert_eq!(estado.bomba, EstadoActuador::Encendido);
                assert_eq!(estado.luz, EstadoActuador::Encendido);
                assert_eq!(estado.nivel_actual, Some(55.0));
                assert_eq!(estado.set_min, Some(30.0));
                assert!(!estado.modo_automatico);
                assert!(!estado.alerta_sobrenivel);
                break;
            }
        }
    }

    #[tokio::test]
    async fn una_falla_de_suscripcion_apaga_cargando_y_deja_error() {
        let (tx_act, rx_act) = mpsc::channel(8);
        let (_tx_cmd, rx_cmd) = mpsc::channel(8);
        let (tx_gw, _rx_gw) = mpsc::channel(8);
        let (tx_hist, _rx_hist) = mpsc::channel(8);
        let (tx_estado, mut rx_estado) = watch::channel(EstadoPlanta::default());
        let (_tx_sesion, rx_sesion) = watch::channel(Sesion::default());

        tokio::spawn(run_estado(rx_act, rx_cmd, tx_estado, tx_gw, tx_hist,
                                rx_sesion, AlmacenPrueba::default()));

        tx_act.send(Actualizacion::Fallo("permiso denegado".to_string())).await.unwrap();

        rx_estado.changed().await.unwrap();
        let estado = rx_estado.borrow_and_update().clone();
        assert!(!estado.cargando);
        assert_eq!(estado.error, Some("permiso denegado".to_string()));
    }
}
